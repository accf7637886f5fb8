//! sid-mcp: Tool Registry client
//!
//! Speaks the Model Context Protocol to a single tool host.
//!
//! Transports:
//! - stdio → child process (development)
//! - streamable HTTP → remote host, bearer token fixed or from Google credentials
//!
//! Lifecycle:
//! connect → initialize → notifications/initialized → tools/list (cached)
//! → tools/call ... → close

pub mod auth;
pub mod client;
pub mod protocol;
pub mod transport;

pub use auth::{GoogleCredentials, GoogleTokenSource, StaticToken, TokenSource};
pub use client::{McpClient, ToolRegistry};
pub use protocol::{McpNotification, McpRequest, McpResponse, McpRpcError, PROTOCOL_VERSION};
pub use transport::{HttpTransport, StdioTransport, Transport};
