//! Session lifecycle: connect, discover tools, disconnect.

use mcp::{Client, ClientConfig};
use tracing::{info, warn};

use crate::Result;
use crate::model::Backend;
use crate::orchestrator::TurnOrchestrator;
use crate::tools::ToolCatalog;

/// A live connection to a tool server together with its tool catalog.
///
/// The catalog is fetched once at connect time and stays fixed for the life
/// of the session. Dropping the session closes the event stream;
/// `disconnect` does the same and logs the outcome.
pub struct Session {
    client: Client,
    catalog: ToolCatalog,
}

impl Session {
    /// Connect to the tool server and load its tool catalog.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let client = Client::connect(config).await?;
        let catalog = ToolCatalog::load(&client).await?;
        info!(
            url = %client.url(),
            server = %client.server_info().server_info.name,
            tools = catalog.len(),
            "session established"
        );
        Ok(Self { client, catalog })
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// A turn orchestrator that runs tools through this session.
    pub fn orchestrator<'a, B: Backend>(&'a self, backend: &'a B) -> TurnOrchestrator<'a, B, Client> {
        TurnOrchestrator::new(backend, &self.catalog, &self.client)
    }

    /// Close the connection. Failures are logged, never returned: the
    /// session is gone either way.
    pub async fn disconnect(self) {
        let url = self.client.url().to_string();
        match self.client.shutdown().await {
            Ok(()) => info!(url = %url, "session closed"),
            Err(e) => warn!(url = %url, error = %e, "error while closing session"),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.client.url())
            .field("tools", &self.catalog.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::time::Duration;

    #[tokio::test]
    async fn invalid_url_is_connection_error() {
        let config = ClientConfig {
            url: "not a url".into(),
            ..Default::default()
        };
        let err = Session::connect(config).await.unwrap_err();
        assert!(matches!(err, Error::Connection(mcp::Error::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn unreachable_server_is_connection_error() {
        // Bind then release a port so nothing is listening on it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ClientConfig {
            url: format!("http://127.0.0.1:{port}/mcp/sse"),
            timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let err = Session::connect(config).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}
