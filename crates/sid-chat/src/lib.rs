//! sid-chat: Orchestration layer for the SID chat service
//!
//! The [`Orchestrator`] owns one completion service and one tool registry,
//! both injected, and turns a conversation into an
//! [`OrchestrationResult`](sid_core::OrchestrationResult).

pub mod action;
pub mod orchestrator;

// Re-export main types
pub use action::decode;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use sid_core::ToolFailurePolicy;
