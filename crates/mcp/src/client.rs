//! MCP client session (handshake, tool discovery, tool calls).

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, ClientInfo, InitializeParams, InitializeResult, JsonRpcRequest,
    ListToolsParams, ListToolsResult, RequestId, Tool,
};
use crate::transport::SseTransport;

/// Default timeout for MCP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default tool server endpoint.
pub const DEFAULT_URL: &str = "http://localhost:5001/mcp/sse";

/// Upper bound on `tools/list` pages followed in one listing.
const MAX_LIST_PAGES: usize = 64;

/// Configuration for connecting to a tool server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub timeout: Duration,
    pub client_name: String,
    pub client_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            client_name: "toolbox-agent".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// An initialized connection to a tool server.
pub struct Client {
    config: ClientConfig,
    transport: SseTransport,
    next_id: AtomicI64,
    server_info: InitializeResult,
}

impl Client {
    /// Connect and perform the `initialize` handshake.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let transport = SseTransport::connect(&config.url, config.timeout).await?;
        let next_id = AtomicI64::new(1);

        let params = InitializeParams::new(ClientInfo {
            name: config.client_name.clone(),
            version: config.client_version.clone(),
        });
        let server_info: InitializeResult =
            request(&transport, &next_id, "initialize", Some(params)).await?;

        transport
            .notify("notifications/initialized", None)
            .await?;

        info!(
            server = %server_info.server_info.name,
            protocol = %server_info.protocol_version,
            "connected to tool server"
        );

        Ok(Self {
            config,
            transport,
            next_id,
            server_info,
        })
    }

    /// The URL this client connected to.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Server info from the handshake.
    pub fn server_info(&self) -> &InitializeResult {
        &self.server_info
    }

    /// List every tool the server offers, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = ListToolsParams { cursor };
            let page: ListToolsResult = self.request("tools/list", Some(params)).await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }

        Err(Error::InvalidResponse(format!(
            "tools/list did not finish within {MAX_LIST_PAGES} pages"
        )))
    }

    /// Call a tool by name.
    ///
    /// A result flagged `isError` is returned as-is; interpreting it is up to
    /// the caller.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        self.request("tools/call", Some(params)).await
    }

    /// Close the connection.
    pub async fn shutdown(self) -> Result<()> {
        debug!(url = %self.config.url, "closing tool server connection");
        drop(self.transport);
        Ok(())
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        request(&self.transport, &self.next_id, method, params).await
    }
}

async fn request<P, R>(
    transport: &SseTransport,
    next_id: &AtomicI64,
    method: &str,
    params: Option<P>,
) -> Result<R>
where
    P: Serialize,
    R: DeserializeOwned,
{
    let id = RequestId::Number(next_id.fetch_add(1, Ordering::SeqCst));
    let mut request = JsonRpcRequest::new(id.clone(), method);
    if let Some(p) = params {
        request = request.with_params(serde_json::to_value(p)?);
    }

    debug!(%method, ?id, "sending request");
    let response = transport.request(request).await?;

    if response.id != id {
        return Err(Error::InvalidResponse(format!(
            "response ID mismatch: expected {id:?}, got {:?}",
            response.id
        )));
    }

    let value = response.into_result()?;
    serde_json::from_value(value).map_err(|e| Error::InvalidResponse(format!("{method}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_local_toolbox() {
        let config = ClientConfig::default();
        assert_eq!(config.url, "http://localhost:5001/mcp/sse");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.client_name, "toolbox-agent");
    }

    #[tokio::test]
    async fn connect_rejects_invalid_url() {
        let config = ClientConfig {
            url: "not a url".into(),
            ..ClientConfig::default()
        };
        let err = Client::connect(config).await.err().unwrap();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }
}
