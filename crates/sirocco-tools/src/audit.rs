//! JSONL audit trail of mutating tool actions and context interventions.

use std::path::Path;

use crate::config::AuditConfig;

/// Longest text payload stored per audit field.
const MAX_FIELD_CHARS: usize = 4000;

#[derive(Debug)]
pub struct AuditLogger {
    destination: AuditDestination,
}

#[derive(Debug)]
enum AuditDestination {
    Stdout,
    File(tokio::sync::Mutex<tokio::fs::File>),
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    ToolShellExecute {
        command: String,
        exit_code: Option<i32>,
        duration_ms: u64,
    },
    ToolFileWrite {
        path: String,
        lines_written: usize,
        overwrite: bool,
    },
    ToolFileEdit {
        path: String,
        replacements: usize,
    },
    HistoryCompression {
        tokens_before: usize,
        tokens_after: usize,
        messages_before: usize,
        messages_after: usize,
        keep_last: usize,
        threshold: usize,
    },
    ToolResponseCompression {
        source_tool: String,
        tokens_before: usize,
        tokens_after: usize,
    },
}

#[derive(serde::Serialize)]
struct AuditRecord<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

impl AuditLogger {
    /// Create a new `AuditLogger` from config.
    ///
    /// # Errors
    ///
    /// Returns an error if a file destination cannot be opened.
    pub async fn from_config(config: &AuditConfig) -> Result<Self, std::io::Error> {
        let destination = if config.destination == "stdout" {
            AuditDestination::Stdout
        } else {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(&config.destination))
                .await?;
            AuditDestination::File(tokio::sync::Mutex::new(file))
        };

        Ok(Self { destination })
    }

    /// Append one event. Logging failures are reported but never propagated.
    pub async fn log(&self, event: &AuditEvent) {
        let record = AuditRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
        };
        let Ok(json) = serde_json::to_string(&record) else {
            return;
        };

        match &self.destination {
            AuditDestination::Stdout => {
                tracing::info!(target: "audit", "{json}");
            }
            AuditDestination::File(file) => {
                use tokio::io::AsyncWriteExt;
                let mut f = file.lock().await;
                let line = format!("{json}\n");
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    tracing::error!("failed to write audit log: {e}");
                }
            }
        }
    }
}

/// Clamp a text payload to the audit field limit, at a char boundary.
#[must_use]
pub fn clamp_field(text: &str) -> String {
    if text.chars().count() <= MAX_FIELD_CHARS {
        return text.to_string();
    }
    let kept: String = text.chars().take(MAX_FIELD_CHARS).collect();
    let dropped = text.chars().count() - MAX_FIELD_CHARS;
    format!("{kept}...[truncated {dropped} chars]")
}
