//! Tool discovery, execution, and MCP integration.

mod catalog;
pub mod errors;
mod invoker;
mod mcp_host;
mod server;

pub use catalog::ToolCatalog;
pub use errors::ToolError;
pub use invoker::{TOOL_ERROR_PREFIX, ToolInvoker, render_result};
pub use server::ToolServer;
