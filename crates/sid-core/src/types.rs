//! Tool catalog, tool calls and orchestration outcome types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition advertised by the tool host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Payload returned by a tool, carried verbatim back into the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Value,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: serde_json::json!({ "error": message.into() }),
            is_error: true,
        }
    }
}

/// Structured directive decoded from model output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionSignal {
    ChangeDatabase { database: String, message: String },
}

impl ActionSignal {
    /// Text intended for display alongside the signal.
    pub fn message(&self) -> &str {
        match self {
            ActionSignal::ChangeDatabase { message, .. } => message,
        }
    }
}

/// Outcome of one orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    /// Every text segment and tool trace line, newline-joined.
    pub final_text: String,
    pub side_effect: Option<ActionSignal>,
    /// Tool calls dispatched during the run, in order.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub rounds: usize,
}

impl OrchestrationResult {
    pub fn text(final_text: impl Into<String>) -> Self {
        Self {
            final_text: final_text.into(),
            side_effect: None,
            tool_calls: Vec::new(),
            rounds: 0,
        }
    }

    /// What the UI should show: the signal's own message, or the raw text.
    pub fn display_text(&self) -> &str {
        match &self.side_effect {
            Some(signal) => signal.message(),
            None => &self.final_text,
        }
    }

    /// Shape consumed by the chat UI.
    pub fn to_wire(&self) -> WireResponse {
        let database_changed = match &self.side_effect {
            Some(ActionSignal::ChangeDatabase { database, .. }) => DatabaseChangedFlag {
                value: true,
                database: Some(database.clone()),
            },
            None => DatabaseChangedFlag::default(),
        };

        WireResponse {
            final_text: self.display_text().to_string(),
            flags: WireFlags { database_changed },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    pub final_text: String,
    pub flags: WireFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFlags {
    pub database_changed: DatabaseChangedFlag,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseChangedFlag {
    pub value: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}
