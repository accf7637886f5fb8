//! Anthropic Claude API Client
//!
//! ## API Endpoints
//!
//! | Endpoint | URL | Purpose |
//! |----------|-----|--------|
//! | Base URL | `https://api.anthropic.com/v1` | All Claude APIs |
//! | Messages | `/messages` | Chat completions |
//!
//! ## Authentication
//! - Header: `x-api-key: {ANTHROPIC_API_KEY}`
//! - Header: `anthropic-version: 2023-06-01`

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sid_core::config::CompletionSettings;
use sid_core::{ContentBlock, Error, Result, Role, ToolDescriptor, Turn, TurnContent};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::provider::{CompletionRequest, CompletionResponse, CompletionService, TokenUsage};

// =============================================================================
// API ENDPOINT CONFIGURATION
// =============================================================================

pub mod endpoints {
    pub const BASE_URL: &str = "https://api.anthropic.com/v1";
    pub const MESSAGES: &str = "/messages";
    pub const API_VERSION: &str = "2023-06-01";
}

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_MAX_TOKENS: u32 = 1000;

// =============================================================================
// DATA STRUCTURES
// =============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<RequestBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

// =============================================================================
// CLIENT IMPLEMENTATION
// =============================================================================

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            api_url: endpoints::BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| Error::config("ANTHROPIC_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    pub fn from_settings(settings: &CompletionSettings) -> Self {
        let client = Self::new(settings.api_key.clone())
            .with_model(settings.model.clone())
            .with_max_tokens(settings.max_tokens);
        match &settings.base_url {
            Some(url) => client.with_base_url(url.clone()),
            None => client,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, request: CompletionRequest) -> AnthropicRequest<'a> {
        let messages = request.turns.into_iter().map(to_wire_message).collect();

        let tools = request.tools.map(|tools| {
            tools
                .into_iter()
                .map(|t: ToolDescriptor| AnthropicTool {
                    name: t.name,
                    description: t.description,
                    input_schema: t.input_schema,
                })
                .collect()
        });

        AnthropicRequest {
            model: &self.model,
            messages,
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            system: request.system,
            temperature: request.temperature,
            tools,
        }
    }
}

fn to_wire_message(turn: Turn) -> AnthropicMessage {
    let role = match turn.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content = match turn.content {
        TurnContent::Text(text) => AnthropicContent::Text(text),
        TurnContent::Blocks(blocks) => {
            AnthropicContent::Blocks(blocks.into_iter().map(to_wire_block).collect())
        }
    };
    AnthropicMessage { role, content }
}

fn to_wire_block(block: ContentBlock) -> RequestBlock {
    match block {
        ContentBlock::Text { text } => RequestBlock::Text { text },
        ContentBlock::ToolUse { id, name, input } => RequestBlock::ToolUse { id, name, input },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => RequestBlock::ToolResult {
            tool_use_id,
            content: tool_result_content(content),
            is_error,
        },
    }
}

/// Tool hosts return MCP content items; the Messages API accepts a string or
/// text/image blocks, so anything else is flattened to JSON text.
fn tool_result_content(content: Value) -> Value {
    match content {
        Value::String(_) => content,
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item.get("type").and_then(Value::as_str) {
                    Some("text") => serde_json::json!({
                        "type": "text",
                        "text": item.get("text").and_then(Value::as_str).unwrap_or_default(),
                    }),
                    Some("image") if item.get("source").is_some() => item,
                    _ => serde_json::json!({ "type": "text", "text": item.to_string() }),
                })
                .collect(),
        ),
        other => Value::String(other.to_string()),
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn classify_error(status: StatusCode, headers: &HeaderMap, body: &str) -> Error {
    let message = serde_json::from_str::<AnthropicErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::rate_limited(message, retry_after(headers)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::authentication(message),
        _ => Error::upstream(status.as_u16(), message),
    }
}

#[async_trait]
impl CompletionService for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}{}", self.api_url, endpoints::MESSAGES);
        let api_request = self.build_request(request);

        info!(
            model = %self.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.as_ref().map(Vec::len).unwrap_or(0),
            "Anthropic completion"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", endpoints::API_VERSION)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::upstream(0, format!("Failed to send Anthropic request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Anthropic API error");
            return Err(classify_error(status, &headers, &body));
        }

        let result: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream(status.as_u16(), format!("Failed to parse Anthropic response: {}", e)))?;

        let content: Vec<ContentBlock> = result
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(ContentBlock::Text { text }),
                ResponseBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolUse { id, name, input }),
                ResponseBlock::Unsupported => None,
            })
            .collect();

        debug!(blocks = content.len(), stop_reason = ?result.stop_reason, "Anthropic response");

        Ok(CompletionResponse {
            content,
            model: result.model,
            stop_reason: result.stop_reason,
            usage: result.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AnthropicClient {
        AnthropicClient::new("sk-test").with_base_url(server.uri())
    }

    #[test]
    fn test_tool_result_content_flattening() {
        let mcp = json!([
            {"type": "text", "text": "{\"databases\":[\"a\",\"b\"]}"},
            {"type": "resource", "resource": {"uri": "db://a"}}
        ]);
        let converted = tool_result_content(mcp);
        assert_eq!(converted[0], json!({"type": "text", "text": "{\"databases\":[\"a\",\"b\"]}"}));
        assert_eq!(converted[1]["type"], "text");
        assert!(converted[1]["text"].as_str().unwrap().contains("db://a"));

        assert_eq!(tool_result_content(json!({"error": "x"})), json!("{\"error\":\"x\"}"));
    }

    #[test]
    fn test_request_wire_shape() {
        let client = AnthropicClient::new("k");
        let turns = vec![
            Turn::user("list dbs"),
            Turn::assistant_blocks(vec![
                ContentBlock::text("Sure"),
                ContentBlock::tool_use("toolu_1", "getDatabases", json!({})),
            ]),
            Turn::tool_results(vec![ContentBlock::tool_result("toolu_1", json!([{"type": "text", "text": "ok"}]), false)]),
        ];
        let tools = vec![ToolDescriptor::new("getDatabases", "List databases", json!({"type": "object"}))];
        let request = client.build_request(CompletionRequest::new(turns).with_tools(tools));
        let wire = serde_json::to_value(&request).unwrap();

        assert_eq!(wire["model"], DEFAULT_MODEL);
        assert_eq!(wire["max_tokens"], 1000);
        assert_eq!(wire["messages"][0], json!({"role": "user", "content": "list dbs"}));
        assert_eq!(wire["messages"][1]["content"][1]["type"], "tool_use");
        assert_eq!(wire["messages"][2]["role"], "user");
        assert_eq!(wire["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(wire["tools"][0]["input_schema"], json!({"type": "object"}));
        assert!(wire.get("temperature").is_none());
    }

    #[test]
    fn test_request_without_tools_omits_field() {
        let client = AnthropicClient::new("k");
        let request = client.build_request(CompletionRequest::new(vec![Turn::user("hi")]));
        let wire = serde_json::to_value(&request).unwrap();
        assert!(wire.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_complete_parses_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", endpoints::API_VERSION))
            .and(body_partial_json(json!({"model": DEFAULT_MODEL})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": DEFAULT_MODEL,
                "content": [
                    {"type": "thinking", "thinking": "hmm", "signature": "s"},
                    {"type": "text", "text": "Sure"},
                    {"type": "tool_use", "id": "toolu_1", "name": "getDatabases", "input": {}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 10, "output_tokens": 5}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server)
            .complete(CompletionRequest::new(vec![Turn::user("list dbs")]))
            .await
            .unwrap();

        assert_eq!(
            response.content,
            vec![
                ContentBlock::text("Sure"),
                ContentBlock::tool_use("toolu_1", "getDatabases", json!({})),
            ]
        );
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_json(json!({"type": "error", "error": {"type": "rate_limit_error", "message": "slow down"}})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"type": "error", "error": {"type": "authentication_error", "message": "invalid x-api-key"}}),
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let request = || CompletionRequest::new(vec![Turn::user("hi")]);

        match client.complete(request()).await {
            Err(Error::RateLimited { message, retry_after }) => {
                assert_eq!(message, "slow down");
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert!(matches!(client.complete(request()).await, Err(Error::Authentication(m)) if m == "invalid x-api-key"));
        assert!(matches!(client.complete(request()).await, Err(Error::Upstream { status: 529, .. })));
    }
}
