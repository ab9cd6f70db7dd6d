//! Tools discovered from the tool server.

use std::collections::HashSet;

use mcp::Tool;
use tracing::{debug, warn};

use super::ToolServer;
use crate::Result;
use crate::model::{ToolConfig, ToolSpec};

/// The set of tools offered by the connected server, fetched once per
/// session.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<Tool>,
}

impl ToolCatalog {
    /// Fetch the full tool list from the server.
    pub async fn load<S: ToolServer>(server: &S) -> Result<Self> {
        let tools = server.list_tools().await?;
        debug!(count = tools.len(), "fetched tool list");
        Ok(Self::from_tools(tools))
    }

    /// Build a catalog from a tool list. Names are unique: when the server
    /// repeats a name, the first definition wins.
    pub fn from_tools(tools: Vec<Tool>) -> Self {
        let mut seen = HashSet::new();
        let tools = tools
            .into_iter()
            .filter(|tool| {
                let fresh = seen.insert(tool.name.clone());
                if !fresh {
                    warn!(tool = %tool.name, "duplicate tool name from server, keeping first");
                }
                fresh
            })
            .collect();
        Self { tools }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool declarations in the shape the model service expects.
    ///
    /// An empty catalog yields `None`: the request then carries no tool
    /// configuration at all.
    pub fn to_service_schema(&self) -> Option<ToolConfig> {
        if self.tools.is_empty() {
            return None;
        }

        let tools = self
            .tools
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name.clone(),
                description: tool.description.clone().unwrap_or_default(),
                input_schema: tool.input_schema.clone(),
            })
            .collect();
        Some(ToolConfig { tools })
    }
}
