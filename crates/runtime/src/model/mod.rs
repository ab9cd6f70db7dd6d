//! Model service protocol types and backend trait.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{
    Backend, ContentBlock, ModelRequest, ModelResponse, Role, StopReason, ToolConfig, ToolResult,
    ToolSpec, ToolUseRequest, Turn, Usage,
};
