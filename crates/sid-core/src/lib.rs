//! Core types and utilities for the SID chat service
//!
//! # Modules
//!
//! - `config`: Environment loading and service configuration
//! - `conversation`: Turns, content blocks and the conversation history
//! - `error`: Error taxonomy and Result alias
//! - `types`: Tool catalog, tool calls and orchestration results

pub mod config;
pub mod conversation;
pub mod error;
pub mod types;

// Re-exports
pub use config::{ServiceConfig, ToolFailurePolicy, ToolHostAuth, ToolHostTarget};
pub use conversation::{ChatMessage, ContentBlock, Conversation, Role, Turn, TurnContent};
pub use error::{Error, Result};
pub use types::*;
