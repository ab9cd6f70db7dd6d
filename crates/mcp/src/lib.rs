//! MCP (Model Context Protocol) client library.
//!
//! This crate provides a client for tool servers reachable over HTTP with
//! server-sent events.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Client, ClientConfig};
//!
//! # async fn example() -> mcp::Result<()> {
//! let client = Client::connect(ClientConfig::default()).await?;
//!
//! for tool in client.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = client
//!     .call_tool("query_sql", Some(serde_json::json!({ "query": "SELECT 1" })))
//!     .await?;
//! println!("{:?}", result.first_text());
//!
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod protocol;
mod transport;

pub use client::{Client, ClientConfig, DEFAULT_TIMEOUT, DEFAULT_URL};
pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, ClientInfo, Incoming, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsParams,
    ListToolsResult, PROTOCOL_VERSION, RequestId, ResourceContents, ServerCapabilities, ServerInfo,
    Tool, ToolContent,
};
pub use transport::SseTransport;
