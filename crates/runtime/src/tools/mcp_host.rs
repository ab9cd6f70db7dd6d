//! MCP-backed tool server.

use super::ToolServer;
use mcp::{CallToolResult, Client, Tool};
use serde_json::Value;

impl ToolServer for Client {
    async fn list_tools(&self) -> Result<Vec<Tool>, mcp::Error> {
        Client::list_tools(self).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<CallToolResult, mcp::Error> {
        Client::call_tool(self, name, arguments).await
    }
}
