use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("invalid tool parameters: {message}")]
    InvalidParams { message: String },

    #[error("execution failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Seam between the session loop and concrete tool backends.
///
/// Executors return their outcome as text destined for the transcript,
/// including failure text for recoverable tool-level errors. `Err` is
/// reserved for dispatch problems the session must handle itself.
pub trait ToolExecutor: Send + Sync {
    /// Run the named tool with JSON parameters.
    ///
    /// # Errors
    ///
    /// Returns `ToolError` for unknown tools or malformed parameters.
    fn run_tool(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> impl Future<Output = Result<String, ToolError>> + Send;
}

/// Decode tool parameters from their JSON value.
///
/// # Errors
///
/// Returns `ToolError::InvalidParams` when the value does not match `T`.
pub fn parse_params<T: DeserializeOwned>(params: &serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(params.clone()).map_err(|e| ToolError::InvalidParams {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Params {
        command: String,
    }

    #[test]
    fn parse_params_decodes_matching_object() {
        let value = serde_json::json!({"command": "ls"});
        let params: Params = parse_params(&value).expect("parse");
        assert_eq!(params.command, "ls");
    }

    #[test]
    fn parse_params_rejects_missing_field() {
        let value = serde_json::json!({"cmd": "ls"});
        let result: Result<Params, _> = parse_params(&value);
        assert!(matches!(result, Err(ToolError::InvalidParams { .. })));
    }
}
