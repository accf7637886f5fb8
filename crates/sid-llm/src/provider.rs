//! Completion Service Traits and Types
//!
//! A completion takes the conversation so far (plus, optionally, the tool
//! catalog) and returns an ordered list of content blocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sid_core::{ContentBlock, Result, ToolCall, ToolDescriptor, Turn};
use std::sync::Arc;

/// Full completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub turns: Vec<Turn>,
    /// `None` means the model sees no tools on this call.
    pub tools: Option<Vec<ToolDescriptor>>,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns,
            tools: None,
            system: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Completion response: content blocks in the order the model emitted them
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    pub fn new(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            model: String::new(),
            stop_reason: None,
            usage: None,
        }
    }

    /// Text blocks in order.
    pub fn text_blocks(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool-use blocks in order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

/// Language-model backend
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &str;

    /// Send the conversation and return the model's content blocks.
    ///
    /// Fails with `RateLimited`, `Authentication` or `Upstream`.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

#[async_trait]
impl<T: CompletionService + ?Sized> CompletionService for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        (**self).complete(request).await
    }
}
