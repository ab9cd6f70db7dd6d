//! Tool server trait.

use mcp::{CallToolResult, Tool};
use serde_json::Value;
use std::future::Future;

/// The remote side of tool discovery and execution.
///
/// This is the boundary between the conversation loop and side effects.
pub trait ToolServer: Send + Sync {
    /// Fetch every tool the server offers.
    fn list_tools(&self) -> impl Future<Output = Result<Vec<Tool>, mcp::Error>> + Send;

    /// Execute one tool call.
    fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> impl Future<Output = Result<CallToolResult, mcp::Error>> + Send;
}
