//! Error types shared by every SID crate

use std::time::Duration;
use thiserror::Error;

/// Main error type for SID operations
#[derive(Error, Debug)]
pub enum Error {
    /// The tool host could not be reached or the handshake failed.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool '{tool}' failed: {message}")]
    ToolInvocation { tool: String, message: String },

    /// The tool host connection dropped while a call was in flight.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Error::Connection(msg.into())
    }

    /// Create an unknown tool error
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Error::UnknownTool(name.into())
    }

    /// Create a tool invocation error
    pub fn tool_invocation(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::ToolInvocation {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Error::RateLimited {
            message: msg.into(),
            retry_after,
        }
    }

    /// Create an authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Error::Authentication(msg.into())
    }

    /// Create an upstream error
    pub fn upstream(status: u16, msg: impl Into<String>) -> Self {
        Error::Upstream {
            status,
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Only rate limiting is worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// Errors that end the current orchestration run no matter the policy.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, Error::Authentication(_) | Error::Transport(_))
    }

    /// Failures scoped to a single tool call.
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, Error::UnknownTool(_) | Error::ToolInvocation { .. })
    }

    /// Server-suggested wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
