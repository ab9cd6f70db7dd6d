//! Tool execution with result normalization.

use mcp::CallToolResult;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ToolCatalog, ToolError, ToolServer};

/// Prefix of every tool result that reports a failure.
pub const TOOL_ERROR_PREFIX: &str = "Error executing tool: ";

/// Executes single tool calls and turns their outcome into text.
pub struct ToolInvoker<'a, S> {
    server: &'a S,
    catalog: Option<&'a ToolCatalog>,
}

impl<'a, S: ToolServer> ToolInvoker<'a, S> {
    pub fn new(server: &'a S) -> Self {
        Self {
            server,
            catalog: None,
        }
    }

    /// Refuse names the catalog does not list instead of sending them to
    /// the server.
    pub fn restrict_to(mut self, catalog: &'a ToolCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Run a tool and return its result text.
    ///
    /// Never fails: any error becomes `"Error executing tool: <cause>"` so the
    /// model can react to it like any other result.
    pub async fn invoke(&self, name: &str, arguments: &Value) -> String {
        match self.try_invoke(name, arguments).await {
            Ok(text) => text,
            Err(e) => {
                warn!(tool = %name, error = %e, "tool execution failed");
                format!("{TOOL_ERROR_PREFIX}{e}")
            }
        }
    }

    async fn try_invoke(&self, name: &str, arguments: &Value) -> Result<String, ToolError> {
        if let Some(catalog) = self.catalog {
            if catalog.get(name).is_none() {
                return Err(ToolError::NotFound(name.to_string()));
            }
        }
        let arguments = tool_arguments(arguments)?;
        let result = self.server.call_tool(name, arguments).await?;
        debug!(tool = %name, items = result.content.len(), "tool returned");

        if result.is_error {
            return Err(ToolError::Reported(render_result(&result)));
        }
        Ok(render_result(&result))
    }
}

/// Tool arguments must be a JSON object; `null` means no arguments.
fn tool_arguments(arguments: &Value) -> Result<Option<Value>, ToolError> {
    match arguments {
        Value::Null => Ok(None),
        Value::Object(_) => Ok(Some(arguments.clone())),
        other => Err(ToolError::InvalidInput(format!(
            "arguments must be a JSON object, got {other}"
        ))),
    }
}

/// The first text item of a result, or the whole result rendered as JSON
/// when it carries no text.
pub fn render_result(result: &CallToolResult) -> String {
    match result.first_text() {
        Some(text) => text.to_string(),
        None => serde_json::to_string(result).unwrap_or_else(|_| format!("{result:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp::{Tool, ToolContent};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedServer {
        reply: Option<CallToolResult>,
        calls: Mutex<Vec<(String, Option<Value>)>>,
    }

    impl ToolServer for ScriptedServer {
        async fn list_tools(&self) -> Result<Vec<Tool>, mcp::Error> {
            Ok(vec![])
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Option<Value>,
        ) -> Result<CallToolResult, mcp::Error> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            self.reply.clone().ok_or(mcp::Error::Disconnected)
        }
    }

    fn text(text: &str) -> ToolContent {
        ToolContent::Text { text: text.into() }
    }

    #[tokio::test]
    async fn returns_first_text_item() {
        let server = ScriptedServer {
            reply: Some(CallToolResult {
                content: vec![text("42"), text("ignored")],
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = ToolInvoker::new(&server)
            .invoke("query_sql", &json!({"query": "SELECT COUNT(*) FROM X"}))
            .await;

        assert_eq!(out, "42");
        let calls = server.calls.lock().unwrap();
        assert_eq!(calls[0].0, "query_sql");
        assert_eq!(calls[0].1, Some(json!({"query": "SELECT COUNT(*) FROM X"})));
    }

    #[tokio::test]
    async fn falls_back_to_rendered_result() {
        let server = ScriptedServer {
            reply: Some(CallToolResult {
                content: vec![],
                structured_content: Some(json!({"rows": 3})),
                is_error: false,
            }),
            ..Default::default()
        };
        let out = ToolInvoker::new(&server).invoke("stats", &Value::Null).await;

        assert_eq!(out, r#"{"content":[],"structuredContent":{"rows":3}}"#);
        assert_eq!(server.calls.lock().unwrap()[0].1, None);
    }

    #[tokio::test]
    async fn transport_failure_becomes_text() {
        let server = ScriptedServer::default();
        let out = ToolInvoker::new(&server).invoke("query_sql", &json!({})).await;
        assert_eq!(out, "Error executing tool: connection to server closed");
    }

    #[tokio::test]
    async fn tool_side_error_becomes_text() {
        let server = ScriptedServer {
            reply: Some(CallToolResult {
                content: vec![text("relation \"x\" does not exist")],
                is_error: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = ToolInvoker::new(&server).invoke("query_sql", &json!({})).await;
        assert_eq!(
            out,
            "Error executing tool: tool reported an error: relation \"x\" does not exist"
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_not_sent() {
        let server = ScriptedServer::default();
        let catalog = ToolCatalog::from_tools(vec![Tool {
            name: "query_sql".into(),
            description: None,
            input_schema: json!({"type": "object"}),
        }]);
        let out = ToolInvoker::new(&server)
            .restrict_to(&catalog)
            .invoke("drop_database", &json!({}))
            .await;

        assert_eq!(out, "Error executing tool: unknown tool: drop_database");
        assert!(server.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_object_arguments_are_rejected_locally() {
        let server = ScriptedServer::default();
        let out = ToolInvoker::new(&server)
            .invoke("query_sql", &json!("SELECT 1"))
            .await;

        assert!(out.starts_with(TOOL_ERROR_PREFIX));
        assert!(out.contains("arguments must be a JSON object"));
        assert!(server.calls.lock().unwrap().is_empty());
    }
}
