//! LLM-backed transcript and tool-output summarization.

use std::time::Duration;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, Role};

/// Prefix for the single-message fallback when the summarizer reply
/// is not a parseable message array.
pub const SUMMARY_FALLBACK_PREFIX: &str = "[conversation summary]\n";

const HISTORY_PROMPT: &str = "You compress agent conversation transcripts. Produce a JSON array of \
messages, each an object with \"role\" (one of system, user, assistant, tool) and \"content\". \
Preserve the original task statement, every decision made so far, file paths touched, commands \
run and their outcomes, and any unresolved errors. Drop greetings, repeated tool noise, and \
superseded intermediate states. Respond with the JSON array only, no commentary.";

const TOOL_OUTPUT_PROMPT: &str = "You compress verbose tool output for an agent transcript. Keep \
everything the agent still needs: error messages with file and line, final results, counts, and \
paths. Drop progress chatter, repeated lines, and banners. Respond with the condensed output \
only, no commentary.";

/// Summarization seam used by the compaction and gating layers.
pub trait Summarizer: Send + Sync {
    /// Condense a transcript segment into replacement messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing LLM call fails or returns nothing usable.
    fn summarize_messages(
        &self,
        task: &str,
        messages: &[Message],
    ) -> impl Future<Output = Result<Vec<Message>, LlmError>> + Send;

    /// Condense one oversized tool output.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing LLM call fails or returns nothing usable.
    fn summarize_tool_output(
        &self,
        tool_name: &str,
        arguments: &str,
        raw: &str,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;
}

pub struct LlmSummarizer<P> {
    provider: P,
    timeout: Duration,
}

impl<P> LlmSummarizer<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(120),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<P: LlmProvider> LlmSummarizer<P> {
    async fn chat_bounded(&self, messages: &[Message]) -> Result<String, LlmError> {
        match tokio::time::timeout(self.timeout, self.provider.chat(messages)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

impl<P: LlmProvider> Summarizer for LlmSummarizer<P> {
    async fn summarize_messages(
        &self,
        task: &str,
        messages: &[Message],
    ) -> Result<Vec<Message>, LlmError> {
        let transcript = render_transcript(messages);
        let request = vec![
            Message::new(Role::System, HISTORY_PROMPT),
            Message::new(
                Role::User,
                format!("Task:\n{task}\n\nTranscript to compress:\n{transcript}"),
            ),
        ];

        let reply = self.chat_bounded(&request).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.provider.name().to_string(),
            });
        }

        match parse_message_array(reply) {
            Some(parsed) if !parsed.is_empty() => Ok(parsed),
            Some(_) => Err(LlmError::StructuredParse(
                "summarizer returned an empty message array".into(),
            )),
            None => {
                tracing::debug!("summarizer reply is not a message array, keeping it verbatim");
                Ok(vec![Message::new(
                    Role::System,
                    format!("{SUMMARY_FALLBACK_PREFIX}{reply}"),
                )])
            }
        }
    }

    async fn summarize_tool_output(
        &self,
        tool_name: &str,
        arguments: &str,
        raw: &str,
    ) -> Result<String, LlmError> {
        let request = vec![
            Message::new(Role::System, TOOL_OUTPUT_PROMPT),
            Message::new(
                Role::User,
                format!("Tool: {tool_name}\nArguments: {arguments}\n\nOutput:\n{raw}"),
            ),
        ];

        let reply = self.chat_bounded(&request).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.provider.name().to_string(),
            });
        }
        Ok(reply.to_string())
    }
}

fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        out.push('[');
        out.push_str(msg.role.label());
        if let Some(ref tool) = msg.tool_name {
            out.push_str(": ");
            out.push_str(tool);
        }
        out.push_str("]\n");
        out.push_str(&msg.content);
        out.push_str("\n\n");
    }
    out
}

/// Extract the outermost JSON array from a possibly fenced or chatty reply.
fn parse_message_array(reply: &str) -> Option<Vec<Message>> {
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        reply: String,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.into(),
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: String::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl LlmProvider for StubProvider {
        async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LlmError::Other("stub failure".into()));
            }
            Ok(self.reply.clone())
        }

        #[allow(clippy::unnecessary_literal_bound)]
        fn name(&self) -> &str {
            "stub"
        }
    }

    fn history() -> Vec<Message> {
        vec![
            Message::new(Role::User, "build the thing"),
            Message::new(Role::Assistant, "working on it"),
        ]
    }

    #[tokio::test]
    async fn parses_json_array_reply() {
        let provider = StubProvider::replying(
            r#"[{"role":"system","content":"summary"},{"role":"user","content":"next"}]"#,
        );
        let summarizer = LlmSummarizer::new(provider);
        let out = summarizer
            .summarize_messages("task", &history())
            .await
            .expect("summarize");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[1].content, "next");
    }

    #[tokio::test]
    async fn parses_fenced_json_array() {
        let provider = StubProvider::replying(
            "```json\n[{\"role\":\"system\",\"content\":\"s\"}]\n```",
        );
        let summarizer = LlmSummarizer::new(provider);
        let out = summarizer
            .summarize_messages("task", &history())
            .await
            .expect("summarize");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "s");
    }

    #[tokio::test]
    async fn prose_reply_falls_back_to_single_system_message() {
        let provider = StubProvider::replying("The agent built the thing and it works.");
        let summarizer = LlmSummarizer::new(provider);
        let out = summarizer
            .summarize_messages("task", &history())
            .await
            .expect("summarize");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, Role::System);
        assert!(out[0].content.starts_with(SUMMARY_FALLBACK_PREFIX));
        assert!(out[0].content.ends_with("it works."));
    }

    #[tokio::test]
    async fn empty_array_reply_is_an_error() {
        let provider = StubProvider::replying("[]");
        let summarizer = LlmSummarizer::new(provider);
        let result = summarizer.summarize_messages("task", &history()).await;
        assert!(matches!(result, Err(LlmError::StructuredParse(_))));
    }

    #[tokio::test]
    async fn empty_reply_is_an_error() {
        let provider = StubProvider::replying("   ");
        let summarizer = LlmSummarizer::new(provider);
        let result = summarizer.summarize_messages("task", &history()).await;
        assert!(matches!(result, Err(LlmError::EmptyResponse { .. })));
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let summarizer = LlmSummarizer::new(StubProvider::failing());
        let result = summarizer.summarize_messages("task", &history()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tool_output_summary_returns_trimmed_reply() {
        let provider = StubProvider::replying("  3 tests passed, 1 failed at src/lib.rs:42  ");
        let summarizer = LlmSummarizer::new(provider);
        let out = summarizer
            .summarize_tool_output("shell", "cargo test", "…5000 lines…")
            .await
            .expect("summarize");
        assert_eq!(out, "3 tests passed, 1 failed at src/lib.rs:42");
    }

    #[tokio::test]
    async fn tool_output_empty_reply_is_an_error() {
        let summarizer = LlmSummarizer::new(StubProvider::replying(""));
        let result = summarizer.summarize_tool_output("shell", "ls", "out").await;
        assert!(matches!(result, Err(LlmError::EmptyResponse { .. })));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        struct SlowProvider;
        impl LlmProvider for SlowProvider {
            async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("late".into())
            }
            #[allow(clippy::unnecessary_literal_bound)]
            fn name(&self) -> &str {
                "slow"
            }
        }

        let summarizer = LlmSummarizer::new(SlowProvider).with_timeout(Duration::from_millis(20));
        let result = summarizer.summarize_messages("task", &history()).await;
        assert!(matches!(result, Err(LlmError::Timeout { .. })));
    }
}
