//! Amazon Bedrock Converse backend.

use crate::model::{
    Backend, ContentBlock, ModelError, ModelRequest, ModelResponse, Role, StopReason, ToolConfig,
    ToolUseRequest, Turn, Usage,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-sonnet-4-5-20250929-v1:0";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<ApiSystemBlock>,
    inference_config: ApiInferenceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ApiToolConfig>,
}

#[derive(Debug, Serialize)]
struct ApiSystemBlock {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiInferenceConfig {
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: Role,
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum ApiContentBlock {
    Text(String),
    ToolUse(ApiToolUse),
    ToolResult(ApiToolResult),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiToolUse {
    tool_use_id: String,
    name: String,
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiToolResult {
    tool_use_id: String,
    content: Vec<ApiToolResultContent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum ApiToolResultContent {
    Text(String),
}

#[derive(Debug, Serialize)]
struct ApiToolConfig {
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum ApiTool {
    ToolSpec(ApiToolSpec),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiToolSpec {
    name: String,
    description: String,
    input_schema: ApiInputSchema,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum ApiInputSchema {
    Json(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    output: Option<ApiOutput>,
    stop_reason: String,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiOutput {
    #[serde(default)]
    message: Option<ApiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Vec<ApiResponseBlock>,
}

/// Response block; only the members this backend understands are decoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponseBlock {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tool_use: Option<ApiToolUse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating a Bedrock backend.
#[derive(Debug, Clone)]
pub struct BedrockBackendBuilder {
    token: String,
    model_id: String,
    region: String,
    max_tokens: u32,
    system: Option<String>,
    endpoint: Option<String>,
}

impl BedrockBackendBuilder {
    /// Create a builder with a Bedrock API key and model id.
    pub fn new(token: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            model_id: model_id.into(),
            region: DEFAULT_REGION.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: None,
            endpoint: None,
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Override the regional runtime endpoint (proxies, VPC endpoints).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn build(self) -> BedrockBackend {
        BedrockBackend {
            client: reqwest::Client::new(),
            token: self.token,
            model_id: self.model_id,
            region: self.region,
            max_tokens: self.max_tokens,
            system: self.system,
            endpoint: self.endpoint,
        }
    }
}

/// Bedrock Converse API backend.
pub struct BedrockBackend {
    client: reqwest::Client,
    token: String,
    model_id: String,
    region: String,
    max_tokens: u32,
    system: Option<String>,
    endpoint: Option<String>,
}

impl BedrockBackend {
    pub fn builder(token: impl Into<String>, model_id: impl Into<String>) -> BedrockBackendBuilder {
        BedrockBackendBuilder::new(token, model_id)
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn converse_url(&self) -> Result<Url, ModelError> {
        let base = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region));
        let mut url = Url::parse(&base)
            .map_err(|e| ModelError::Config(format!("invalid endpoint {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ModelError::Config(format!("endpoint {base} cannot carry a path")))?
            .pop_if_empty()
            .extend(["model", self.model_id.as_str(), "converse"]);
        Ok(url)
    }

    fn turn_to_api(turn: &Turn) -> ApiMessage {
        let content = turn
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { value } => ApiContentBlock::Text(value.clone()),
                ContentBlock::ToolUse(request) => ApiContentBlock::ToolUse(ApiToolUse {
                    tool_use_id: request.id.clone(),
                    name: request.tool_name.clone(),
                    input: request.arguments.clone(),
                }),
                ContentBlock::ToolResult(result) => ApiContentBlock::ToolResult(ApiToolResult {
                    tool_use_id: result.tool_use_id.clone(),
                    content: vec![ApiToolResultContent::Text(result.text.clone())],
                }),
            })
            .collect();

        ApiMessage {
            role: turn.role,
            content,
        }
    }

    fn tool_config_to_api(config: &ToolConfig) -> ApiToolConfig {
        ApiToolConfig {
            tools: config
                .tools
                .iter()
                .map(|spec| {
                    ApiTool::ToolSpec(ApiToolSpec {
                        name: spec.name.clone(),
                        description: spec.description.clone(),
                        input_schema: ApiInputSchema::Json(spec.input_schema.clone()),
                    })
                })
                .collect(),
        }
    }

    fn request_to_api(&self, request: ModelRequest<'_>) -> ApiRequest {
        ApiRequest {
            messages: request.messages.iter().map(Self::turn_to_api).collect(),
            system: self
                .system
                .iter()
                .map(|text| ApiSystemBlock { text: text.clone() })
                .collect(),
            inference_config: ApiInferenceConfig {
                max_tokens: self.max_tokens,
            },
            tool_config: request.tool_config.map(Self::tool_config_to_api),
        }
    }

    fn response_from_api(response: ApiResponse) -> ModelResponse {
        let message = response
            .output
            .and_then(|output| output.message)
            .map(|message| {
                let content = message
                    .content
                    .into_iter()
                    .filter_map(|block| match (block.text, block.tool_use) {
                        (_, Some(tool_use)) => Some(ContentBlock::ToolUse(ToolUseRequest {
                            id: tool_use.tool_use_id,
                            tool_name: tool_use.name,
                            arguments: tool_use.input,
                        })),
                        (Some(text), None) => Some(ContentBlock::text(text)),
                        (None, None) => {
                            debug!("dropping unsupported response block");
                            None
                        }
                    })
                    .collect();
                Turn::assistant(content)
            });

        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            })
            .unwrap_or_default();

        ModelResponse {
            stop_reason: StopReason::parse(&response.stop_reason),
            message,
            usage,
        }
    }
}

/// Pull the human-readable message out of an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("Message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

impl std::fmt::Display for BedrockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bedrock({}, region={})", self.model_id, self.region)
    }
}

impl Backend for BedrockBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let url = self.converse_url()?;
        let api_request = self.request_to_api(request);

        debug!(
            model = %self.model_id,
            messages = api_request.messages.len(),
            tools = api_request.tool_config.as_ref().map_or(0, |c| c.tools.len()),
            "calling converse"
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {}", error_message(&body))));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(Self::response_from_api(api_response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ToolResult, ToolSpec};
    use serde_json::json;

    fn backend() -> BedrockBackend {
        BedrockBackend::builder("token", DEFAULT_MODEL_ID).build()
    }

    #[test]
    fn converse_url_for_region() {
        let url = BedrockBackend::builder("t", "anthropic.claude-v2:1")
            .region("eu-west-1")
            .build()
            .converse_url()
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://bedrock-runtime.eu-west-1.amazonaws.com/model/anthropic.claude-v2:1/converse"
        );
    }

    #[test]
    fn converse_url_escapes_arn_model_ids() {
        let url = BedrockBackend::builder("t", "arn:aws:bedrock:us-east-1:1:inference-profile/p")
            .endpoint("http://localhost:8080/")
            .build()
            .converse_url()
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/model/arn:aws:bedrock:us-east-1:1:inference-profile%2Fp/converse"
        );
    }

    #[test]
    fn request_wire_format() {
        let history = vec![
            Turn::user("How many rows in table X?"),
            Turn::assistant(vec![ContentBlock::ToolUse(ToolUseRequest {
                id: "t1".into(),
                tool_name: "query_sql".into(),
                arguments: json!({"query": "SELECT COUNT(*) FROM X"}),
            })]),
            Turn::tool_results(vec![ToolResult::new("t1", "42")]),
        ];
        let config = ToolConfig {
            tools: vec![ToolSpec {
                name: "query_sql".into(),
                description: String::new(),
                input_schema: json!({"type": "object"}),
            }],
        };

        let api = backend().request_to_api(ModelRequest {
            messages: &history,
            tool_config: Some(&config),
        });
        let value = serde_json::to_value(&api).unwrap();

        assert_eq!(
            value["messages"][0],
            json!({"role": "user", "content": [{"text": "How many rows in table X?"}]})
        );
        assert_eq!(
            value["messages"][1]["content"][0],
            json!({"toolUse": {
                "toolUseId": "t1",
                "name": "query_sql",
                "input": {"query": "SELECT COUNT(*) FROM X"}
            }})
        );
        assert_eq!(
            value["messages"][2]["content"][0],
            json!({"toolResult": {"toolUseId": "t1", "content": [{"text": "42"}]}})
        );
        assert_eq!(
            value["toolConfig"],
            json!({"tools": [{"toolSpec": {
                "name": "query_sql",
                "description": "",
                "inputSchema": {"json": {"type": "object"}}
            }}]})
        );
        assert_eq!(value["inferenceConfig"]["maxTokens"], 4096);
        assert!(value.get("system").is_none());
    }

    #[test]
    fn request_without_tools_omits_tool_config() {
        let history = vec![Turn::user("hi")];
        let api = BedrockBackend::builder("t", DEFAULT_MODEL_ID)
            .system("Be terse.")
            .build()
            .request_to_api(ModelRequest {
                messages: &history,
                tool_config: None,
            });
        let value = serde_json::to_value(&api).unwrap();
        assert!(value.get("toolConfig").is_none());
        assert_eq!(value["system"], json!([{"text": "Be terse."}]));
    }

    #[test]
    fn response_decoding() {
        let api: ApiResponse = serde_json::from_value(json!({
            "output": {"message": {"role": "assistant", "content": [
                {"text": "Checking."},
                {"reasoningContent": {"reasoningText": {"text": "hmm"}}},
                {"toolUse": {"toolUseId": "t1", "name": "query_sql", "input": {"query": "SELECT 1"}}}
            ]}},
            "stopReason": "tool_use",
            "usage": {"inputTokens": 10, "outputTokens": 5, "totalTokens": 15},
            "metrics": {"latencyMs": 100}
        }))
        .unwrap();

        let response = BedrockBackend::response_from_api(api);
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(
            response.usage,
            Usage {
                input_tokens: 10,
                output_tokens: 5
            }
        );

        let turn = response.message.unwrap();
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.content.len(), 2);
        assert_eq!(turn.text(), "Checking.");
        assert_eq!(turn.tool_requests()[0].id, "t1");
    }

    #[test]
    fn response_without_message() {
        let api: ApiResponse =
            serde_json::from_value(json!({"output": {}, "stopReason": "content_filtered"}))
                .unwrap();
        let response = BedrockBackend::response_from_api(api);
        assert!(response.message.is_none());
        assert_eq!(response.stop_reason, StopReason::ContentFiltered);
    }

    #[test]
    fn error_message_extraction() {
        assert_eq!(
            error_message(r#"{"message":"The security token included in the request is invalid."}"#),
            "The security token included in the request is invalid."
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn display() {
        assert_eq!(
            backend().to_string(),
            "bedrock(anthropic.claude-sonnet-4-5-20250929-v1:0, region=us-east-1)"
        );
    }
}
