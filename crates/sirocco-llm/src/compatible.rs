//! Provider for OpenAI-compatible chat completion endpoints.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, Role};

pub struct CompatibleProvider {
    client: reqwest::Client,
    provider_name: String,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl fmt::Debug for CompatibleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompatibleProvider")
            .field("provider_name", &self.provider_name)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl Clone for CompatibleProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            provider_name: self.provider_name.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

impl CompatibleProvider {
    #[must_use]
    pub fn new(
        provider_name: String,
        api_key: String,
        mut base_url: String,
        model: String,
        max_tokens: u32,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(),
            provider_name,
            api_key,
            base_url,
            model,
            max_tokens,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn send_request(&self, messages: &[Message]) -> Result<String, LlmError> {
        let api_messages = convert_messages(messages);
        let body = ChatRequest {
            model: &self.model,
            messages: &api_messages,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }

        if !status.is_success() {
            tracing::error!("{} API error {status}: {text}", self.provider_name);
            return Err(LlmError::Other(format!(
                "{} API request failed (status {status})",
                self.provider_name
            )));
        }

        let resp: ChatCompletionResponse = serde_json::from_str(&text)?;

        resp.choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: self.provider_name.clone(),
            })
    }
}

impl LlmProvider for CompatibleProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        match self.send_request(messages).await {
            Ok(text) => Ok(text),
            Err(LlmError::RateLimited) => {
                tracing::warn!("{} rate limited, retrying in 1s", self.provider_name);
                tokio::time::sleep(Duration::from_secs(1)).await;
                self.send_request(messages).await
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

// Tool messages travel as user turns: compatible endpoints reject
// role "tool" without a matching tool_call id.
fn convert_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: match m.role {
                Role::System => "system",
                Role::User | Role::Tool => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> CompatibleProvider {
        CompatibleProvider::new(
            "groq".into(),
            "key".into(),
            "https://api.groq.com/openai/v1/".into(),
            "llama-3.3-70b".into(),
            4096,
        )
    }

    #[test]
    fn name_returns_custom_provider_name() {
        assert_eq!(test_provider().name(), "groq");
    }

    #[test]
    fn base_url_trailing_slashes_trimmed() {
        let p = test_provider();
        assert_eq!(p.base_url, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn clone_preserves_name() {
        let c = test_provider().clone();
        assert_eq!(c.name(), "groq");
    }

    #[test]
    fn debug_redacts_api_key() {
        let debug = format!("{:?}", test_provider());
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("key\""));
    }

    #[test]
    fn convert_maps_tool_role_to_user() {
        let msgs = vec![
            Message::new(Role::System, "s"),
            Message::tool("shell", "out"),
        ];
        let api = convert_messages(&msgs);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[1].content, "out");
    }

    #[tokio::test]
    async fn chat_unreachable_endpoint_errors() {
        let p = CompatibleProvider::new(
            "test".into(),
            "key".into(),
            "http://127.0.0.1:1".into(),
            "m".into(),
            100,
        );
        let msgs = vec![Message::new(Role::User, "hello")];
        assert!(p.chat(&msgs).await.is_err());
    }
}
