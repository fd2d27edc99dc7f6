//! Pre-admission gate for tool output.
//!
//! Raw tool output is priced before it enters the transcript. Anything
//! over the limit is summarized once; if that fails, the raw output is
//! admitted untouched. The gate degrades, it never blocks.

use std::sync::Arc;

use sirocco_llm::Summarizer;
use sirocco_tools::{AuditEvent, AuditLogger};

use crate::meter::TokenMeter;

pub struct ToolOutputGate<M> {
    meter: M,
    token_limit: usize,
    audit_logger: Option<Arc<AuditLogger>>,
}

impl<M: TokenMeter> ToolOutputGate<M> {
    pub fn new(meter: M, token_limit: usize) -> Self {
        Self {
            meter,
            token_limit,
            audit_logger: None,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    /// Compress `raw` if it prices over the limit.
    ///
    /// Returns `Some(summary)` on a successful compression, `None` when
    /// the output fits or when the summarizer fails.
    pub async fn maybe_compress<S: Summarizer>(
        &self,
        tool_name: &str,
        arguments: &serde_json::Value,
        raw: &str,
        summarizer: &S,
    ) -> Option<String> {
        let before = self.meter.count(raw);
        if before <= self.token_limit {
            return None;
        }

        let args_text = render_arguments(arguments);
        match summarizer
            .summarize_tool_output(tool_name, &args_text, raw)
            .await
        {
            Ok(summary) => {
                let after = self.meter.count(&summary);
                if let Some(ref logger) = self.audit_logger {
                    logger
                        .log(&AuditEvent::ToolResponseCompression {
                            source_tool: tool_name.to_string(),
                            tokens_before: before,
                            tokens_after: after,
                        })
                        .await;
                }
                tracing::debug!(tool = tool_name, before, after, "tool output compressed");
                Some(summary)
            }
            Err(e) => {
                tracing::warn!(
                    tool = tool_name,
                    "tool output compression failed, keeping raw output: {e}"
                );
                None
            }
        }
    }
}

fn render_arguments(arguments: &serde_json::Value) -> String {
    match arguments {
        serde_json::Value::Null => String::new(),
        // A string payload may itself carry encoded JSON; normalize it
        // to the compact form so the prompt sees one representation.
        serde_json::Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(inner) if inner.is_object() || inner.is_array() => inner.to_string(),
            _ => s.clone(),
        },
        other => other.to_string(),
    }
}
