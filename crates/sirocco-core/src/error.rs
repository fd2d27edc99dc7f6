use sirocco_llm::LlmError;
use sirocco_tools::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("session has no task")]
    NoTask,
}
