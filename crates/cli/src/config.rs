//! Configuration loading: defaults, toolbox-agent.toml, environment, flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use runtime::{DEFAULT_MAX_ROUNDS, DEFAULT_MAX_TOKENS, DEFAULT_MODEL_ID, DEFAULT_REGION, Dispatch};
use serde::Deserialize;

/// Config file looked up in the working directory when `--config` is absent.
pub const CONFIG_FILE: &str = "toolbox-agent.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mcp: McpConfig,
    pub model: ModelConfig,
    pub agent: AgentConfig,
}

/// Tool server connection.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct McpConfig {
    pub url: String,
    /// Seconds to wait for the server on connect and on each request.
    pub timeout_secs: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            url: mcp::DEFAULT_URL.to_string(),
            timeout_secs: mcp::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

/// Model service settings.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub id: String,
    pub region: String,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    /// Bedrock API key. Prefer `AWS_BEARER_TOKEN_BEDROCK` over writing it here.
    pub bearer_token: Option<String>,
    /// Custom runtime endpoint, replacing the regional default.
    pub endpoint: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_MODEL_ID.to_string(),
            region: DEFAULT_REGION.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: None,
            bearer_token: None,
            endpoint: None,
        }
    }
}

/// Turn loop settings.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Tool rounds allowed per message; 0 removes the bound.
    pub max_tool_rounds: usize,
    pub parallel_tools: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_ROUNDS,
            parallel_tools: false,
        }
    }
}

/// Command-line values that take precedence over everything else.
#[derive(Debug, Default)]
pub struct Overrides {
    pub mcp_url: Option<String>,
    pub model: Option<String>,
    pub region: Option<String>,
    pub max_tool_rounds: Option<usize>,
    pub parallel_tools: bool,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolve the full layered configuration.
    ///
    /// An explicit `path` must exist; otherwise `toolbox-agent.toml` is used
    /// when present and the built-in defaults when not.
    pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_overrides(overrides);
        Ok(config)
    }

    /// Overlay values from the environment. Empty variables are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = var("MCP_URL") {
            self.mcp.url = url;
        }
        if let Some(id) = var("BEDROCK_MODEL_ID") {
            self.model.id = id;
        }
        if let Some(region) = var("AWS_REGION") {
            self.model.region = region;
        }
        if let Some(token) = var("AWS_BEARER_TOKEN_BEDROCK") {
            self.model.bearer_token = Some(token);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.mcp_url {
            self.mcp.url = url.clone();
        }
        if let Some(model) = &overrides.model {
            self.model.id = model.clone();
        }
        if let Some(region) = &overrides.region {
            self.model.region = region.clone();
        }
        if let Some(rounds) = overrides.max_tool_rounds {
            self.agent.max_tool_rounds = rounds;
        }
        if overrides.parallel_tools {
            self.agent.parallel_tools = true;
        }
    }

    /// The Bedrock API key, required before anything connects.
    pub fn bearer_token(&self) -> Result<&str, ConfigError> {
        self.model
            .bearer_token
            .as_deref()
            .ok_or(ConfigError::MissingToken)
    }

    pub fn client_config(&self) -> mcp::ClientConfig {
        mcp::ClientConfig {
            url: self.mcp.url.clone(),
            timeout: Duration::from_secs(self.mcp.timeout_secs),
            ..Default::default()
        }
    }

    pub fn max_rounds(&self) -> Option<usize> {
        (self.agent.max_tool_rounds > 0).then_some(self.agent.max_tool_rounds)
    }

    pub fn dispatch(&self) -> Dispatch {
        if self.agent.parallel_tools {
            Dispatch::Concurrent
        } else {
            Dispatch::Sequential
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error(
        "Bedrock API key not configured: set AWS_BEARER_TOKEN_BEDROCK or model.bearer_token"
    )]
    MissingToken,
}
