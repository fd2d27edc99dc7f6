//! Dispatch over the concrete executors by tool name.

use crate::executor::{ToolError, ToolExecutor};
use crate::file::FileExecutor;
use crate::shell::ShellExecutor;

#[derive(Debug)]
pub struct CompositeExecutor {
    shell: ShellExecutor,
    file: FileExecutor,
}

impl CompositeExecutor {
    #[must_use]
    pub fn new(shell: ShellExecutor, file: FileExecutor) -> Self {
        Self { shell, file }
    }
}

impl ToolExecutor for CompositeExecutor {
    async fn run_tool(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<String, ToolError> {
        match name {
            "shell" => self.shell.run_tool(name, params).await,
            "write_file" | "edit_file" => self.file.run_tool(name, params).await,
            _ => Err(ToolError::UnknownTool { name: name.into() }),
        }
    }
}
