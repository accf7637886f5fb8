//! sid-llm: Completion Service integration
//!
//! | Provider | Base URL | Auth Method |
//! |----------|----------|-------------|
//! | Anthropic | `https://api.anthropic.com/v1` | `x-api-key: {KEY}` |
//!
//! The orchestrator only depends on [`CompletionService`]; the Anthropic client
//! and the retry decorator are the concrete pieces wired up by the server.

pub mod anthropic;
pub mod provider;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use provider::{CompletionRequest, CompletionResponse, CompletionService, TokenUsage};
pub use retry::{RetryPolicy, RetryingCompletionService};
