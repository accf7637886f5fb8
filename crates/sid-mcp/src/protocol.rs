//! MCP JSON-RPC envelope types

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sid_core::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const CLIENT_NAME: &str = "SID-Client";
pub const CLIENT_VERSION: &str = "1.0.0";

/// MCP JSON-RPC request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        static REQUEST_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            jsonrpc: "2.0".to_string(),
            id: json!(REQUEST_ID.fetch_add(1, Ordering::SeqCst)),
            method: method.to_string(),
            params,
        }
    }

    pub fn initialize() -> Self {
        Self::new(
            "initialize",
            Some(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": CLIENT_NAME,
                    "version": CLIENT_VERSION
                }
            })),
        )
    }

    pub fn list_tools(cursor: Option<&str>) -> Self {
        Self::new("tools/list", cursor.map(|c| json!({ "cursor": c })))
    }

    pub fn call_tool(name: &str, arguments: Value) -> Self {
        Self::new(
            "tools/call",
            Some(json!({
                "name": name,
                "arguments": arguments
            })),
        )
    }
}

/// JSON-RPC notification (no id, no response)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpNotification {
    pub fn new(method: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: None,
        }
    }

    pub fn initialized() -> Self {
        Self::new("notifications/initialized")
    }
}

/// MCP JSON-RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpRpcError>,
}

impl McpResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Result payload, or the RPC error attributed to `context`.
    pub fn into_result(self, context: &str) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::tool_invocation(
                context,
                format!("{} (code {})", error.message, error.code),
            )),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// MCP RPC Error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A message read from the tool host
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Reply to one of our requests
    Response(McpResponse),
    /// Server-initiated request that expects a reply
    Request { id: Value, method: String },
    Notification { method: String },
}

impl Incoming {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let method = value.get("method").and_then(Value::as_str).map(str::to_string);
        let id = value.get("id").cloned().filter(|id| !id.is_null());

        match (method, id) {
            (Some(method), Some(id)) => Ok(Incoming::Request { id, method }),
            (Some(method), None) => Ok(Incoming::Notification { method }),
            (None, _) => Ok(Incoming::Response(serde_json::from_value(value)?)),
        }
    }
}
