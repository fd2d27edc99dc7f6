//! Bash command execution via `tokio::process::Command`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::process::Command;

use crate::audit::{AuditEvent, AuditLogger, clamp_field};
use crate::config::ShellConfig;
use crate::executor::{ToolError, ToolExecutor, parse_params};

#[derive(Debug, Deserialize)]
pub struct ShellParams {
    pub command: String,
}

#[derive(Debug)]
pub struct ShellExecutor {
    timeout: Duration,
    audit_logger: Option<Arc<AuditLogger>>,
}

impl ShellExecutor {
    #[must_use]
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout),
            audit_logger: None,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    /// Run one command under bash and render its outcome as transcript text.
    ///
    /// Failure modes (spawn error, timeout, non-zero exit) come back as
    /// `[error]` / `[exit code N]` text rather than `Err`, so the session
    /// can show them to the model.
    pub async fn run(&self, command: &str) -> String {
        let started = Instant::now();
        let spawned = Command::new("bash")
            .arg("-c")
            .arg(command)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.log_audit(command, None, started.elapsed()).await;
                return format!("[error] failed to spawn bash: {e}");
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                self.log_audit(command, None, started.elapsed()).await;
                return format!("[error] command failed: {e}");
            }
            Err(_) => {
                self.log_audit(command, None, started.elapsed()).await;
                return format!("[error] command timed out after {}s", self.timeout.as_secs());
            }
        };

        self.log_audit(command, output.status.code(), started.elapsed())
            .await;
        render_output(&output)
    }

    async fn log_audit(&self, command: &str, exit_code: Option<i32>, elapsed: Duration) {
        if let Some(ref logger) = self.audit_logger {
            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = elapsed.as_millis() as u64;
            logger
                .log(&AuditEvent::ToolShellExecute {
                    command: clamp_field(command),
                    exit_code,
                    duration_ms,
                })
                .await;
        }
    }
}

impl ToolExecutor for ShellExecutor {
    async fn run_tool(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<String, ToolError> {
        if name != "shell" {
            return Err(ToolError::UnknownTool { name: name.into() });
        }
        let params: ShellParams = parse_params(params)?;
        Ok(self.run(&params.command).await)
    }
}

fn render_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut rendered = stdout.trim_end().to_string();
    if !stderr.trim().is_empty() {
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        rendered.push_str("[stderr]\n");
        rendered.push_str(stderr.trim_end());
    }
    if !output.status.success() {
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        rendered.push_str(&format!(
            "[exit code {}]",
            output.status.code().unwrap_or(-1)
        ));
    }
    if rendered.is_empty() {
        rendered.push_str("(no output)");
    }
    rendered
}
