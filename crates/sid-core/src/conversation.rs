//! Conversation model: turns, content blocks and the append-only history
//! the orchestrator owns for the duration of a run.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Typed unit within a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
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
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: Value, is_error: bool) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
            is_error,
        }
    }
}

/// Turn body: either plain text or a list of blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl TurnContent {
    /// Blocks view of the content; plain text becomes a single text block.
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match self {
            TurnContent::Text(text) => vec![ContentBlock::text(text.clone())],
            TurnContent::Blocks(blocks) => blocks.clone(),
        }
    }
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Blocks(blocks),
        }
    }

    /// Tool results are fed back to the model as user-origin input.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Blocks(results),
        }
    }
}

/// Inbound chat message as sent by the UI (`{text, isUser}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    #[serde(default)]
    pub is_user: bool,
}

/// Ordered, append-only list of turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a conversation from caller-supplied turns, checking tool-call pairing.
    pub fn from_turns(turns: Vec<Turn>) -> Result<Self> {
        let conversation = Self { turns };
        conversation.validate()?;
        Ok(conversation)
    }

    /// Map UI messages to turns: `isUser` → user, anything else → assistant.
    pub fn from_messages(messages: &[ChatMessage]) -> Self {
        let turns = messages
            .iter()
            .map(|m| {
                if m.is_user {
                    Turn::user(m.text.clone())
                } else {
                    Turn::assistant(m.text.clone())
                }
            })
            .collect();
        Self { turns }
    }

    pub fn push(&mut self, turn: Turn) -> Result<()> {
        check_turn(&turn, &mut self.known_call_ids())?;
        self.turns.push(turn);
        Ok(())
    }

    /// Append one user turn carrying every tool result of a round.
    pub fn append_tool_results(&mut self, results: Vec<ContentBlock>) -> Result<()> {
        self.push(Turn::tool_results(results))
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }

    /// Call ids emitted by tool-use blocks so far.
    pub fn known_call_ids(&self) -> HashSet<String> {
        self.turns
            .iter()
            .flat_map(|t| t.content.blocks())
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Every tool result must reference a tool use that precedes it.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for turn in &self.turns {
            check_turn(turn, &mut seen)?;
        }
        Ok(())
    }
}

/// Walk a turn's blocks in order, recording tool-use ids into `known` and
/// rejecting tool results that reference an id not seen yet.
fn check_turn(turn: &Turn, known: &mut HashSet<String>) -> Result<()> {
    let TurnContent::Blocks(blocks) = &turn.content else {
        return Ok(());
    };
    for block in blocks {
        match block {
            ContentBlock::ToolUse { id, .. } => {
                known.insert(id.clone());
            }
            ContentBlock::ToolResult { tool_use_id, .. } if !known.contains(tool_use_id) => {
                return Err(Error::invalid_argument(format!(
                    "tool result references unknown call id '{}'",
                    tool_use_id
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
