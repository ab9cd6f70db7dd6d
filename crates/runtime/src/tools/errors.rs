use thiserror::Error;

/// Errors that can occur during tool execution.
///
/// These never leave the invoker: they are rendered into the tool result
/// text the model sees.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("tool reported an error: {0}")]
    Reported(String),
    #[error(transparent)]
    Protocol(#[from] mcp::Error),
}
