//! Transport Layer
//!
//! Client-side transports to a tool host:
//! - Stdio (child process, newline-delimited JSON-RPC)
//! - HTTP (MCP streamable HTTP, JSON or SSE responses)

mod http;
mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use crate::protocol::{McpNotification, McpRequest, McpResponse};
use sid_core::Result;

/// Transport trait - implement for new transport types
///
/// Implementations must be safe to share between concurrent callers: every
/// `request` gets back the response carrying its own id.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for its response
    async fn request(&self, request: McpRequest) -> Result<McpResponse>;

    /// Send a notification (no response expected)
    async fn notify(&self, notification: McpNotification) -> Result<()>;

    /// Release the connection; calling it twice is harmless
    async fn close(&self) -> Result<()>;
}
