//! Tool registry client
//!
//! Connects to a tool host, performs the MCP handshake, caches the tool
//! catalog once and dispatches `tools/call` requests.

use crate::auth::token_source;
use crate::protocol::{McpNotification, McpRequest};
use crate::transport::{HttpTransport, StdioTransport, Transport};
use async_trait::async_trait;
use serde_json::Value;
use sid_core::{Error, Result, ToolDescriptor, ToolHostTarget, ToolResult};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Upper bound on `tools/list` pages followed during connect.
const MAX_CATALOG_PAGES: usize = 64;

/// Catalog of external tools and the means to invoke them
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Cached catalog, in the order the host advertised it.
    fn tools(&self) -> Vec<ToolDescriptor>;

    /// Invoke a tool by name.
    ///
    /// Fails with `UnknownTool`, `ToolInvocation` or `Transport`.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult>;

    /// Release the tool host. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// MCP client bound to one tool host
pub struct McpClient {
    transport: Box<dyn Transport>,
    tools: Vec<ToolDescriptor>,
    server_info: Option<Value>,
    closed: AtomicBool,
}

impl McpClient {
    /// Start (or reach) the tool host described by `target` and handshake.
    pub async fn connect(target: &ToolHostTarget) -> Result<Self> {
        info!(tool_host = %target, "Connecting to tool host");

        let transport: Box<dyn Transport> = match target {
            ToolHostTarget::Stdio { command, args } => Box::new(StdioTransport::spawn(command, args)?),
            ToolHostTarget::Http { url, auth } => {
                let mut transport = HttpTransport::new(url.clone())?;
                if let Some(source) = token_source(auth)? {
                    transport = transport.with_token_source(source);
                }
                Box::new(transport)
            }
        };

        Self::with_transport(transport).await
    }

    /// Handshake over an existing transport and cache the catalog.
    pub async fn with_transport(transport: Box<dyn Transport>) -> Result<Self> {
        match handshake(transport.as_ref()).await {
            Ok((server_info, tools)) => {
                info!(
                    tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                    "Connected to tool host"
                );
                Ok(Self {
                    transport,
                    tools,
                    server_info,
                    closed: AtomicBool::new(false),
                })
            }
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    debug!(error = %close_err, "Closing transport after failed handshake");
                }
                Err(match e {
                    Error::Connection(_) => e,
                    other => Error::connection(other.to_string()),
                })
            }
        }
    }

    /// `serverInfo` from the initialize result, if the host sent one.
    pub fn server_info(&self) -> Option<&Value> {
        self.server_info.as_ref()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn handshake(transport: &dyn Transport) -> Result<(Option<Value>, Vec<ToolDescriptor>)> {
    let init = transport
        .request(McpRequest::initialize())
        .await?
        .into_result("initialize")?;
    debug!(result = %init, "Tool host initialized");
    transport.notify(McpNotification::initialized()).await?;

    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..MAX_CATALOG_PAGES {
        let page = transport
            .request(McpRequest::list_tools(cursor.as_deref()))
            .await?
            .into_result("tools/list")?;

        let batch: Vec<ToolDescriptor> =
            serde_json::from_value(page.get("tools").cloned().unwrap_or(Value::Array(vec![])))?;
        tools.extend(batch);

        cursor = page
            .get("nextCursor")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if cursor.is_none() {
            return Ok((init.get("serverInfo").cloned(), tools));
        }
    }

    Err(Error::connection(format!(
        "tools/list did not finish within {} pages",
        MAX_CATALOG_PAGES
    )))
}

/// Concatenated text items of an MCP `content` array.
fn content_text(content: &Value) -> String {
    match content {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ToolRegistry for McpClient {
    fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools.clone()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        if self.is_closed() {
            return Err(Error::transport("tool registry is closed"));
        }
        if !self.has_tool(name) {
            return Err(Error::unknown_tool(name));
        }

        debug!(tool = %name, args = %arguments, "Calling tool");
        let result = self
            .transport
            .request(McpRequest::call_tool(name, arguments))
            .await?
            .into_result(name)?;

        let content = result.get("content").cloned().unwrap_or_else(|| result.clone());
        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if is_error {
            let message = content_text(&content);
            warn!(tool = %name, error = %message, "Tool reported an error");
            return Err(Error::tool_invocation(name, message));
        }

        Ok(ToolResult::success(content))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing tool host connection");
        self.transport.close().await
    }
}
