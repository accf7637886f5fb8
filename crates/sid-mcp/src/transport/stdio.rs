//! Stdio Transport
//!
//! Talks to a tool host child process over its stdin/stdout, one JSON-RPC
//! message per line. A reader task routes each response to the caller
//! waiting on its id.

use super::Transport;
use crate::protocol::{Incoming, McpNotification, McpRequest, McpResponse};
use serde_json::json;
use sid_core::{Error, Result};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const METHOD_NOT_FOUND: i32 = -32601;
const CHILD_EXIT_GRACE: Duration = Duration::from_secs(2);

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type Pending = HashMap<String, oneshot::Sender<McpResponse>>;

struct Shared {
    writer: Mutex<Option<Writer>>,
    pending: std::sync::Mutex<Pending>,
    closed: AtomicBool,
}

impl Shared {
    async fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::transport("tool host connection is closed"))?;

        debug!(message = %line, "Sending to tool host");
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::transport(format!("write to tool host failed: {}", e)))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| Error::transport(format!("write to tool host failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::transport(format!("flush to tool host failed: {}", e)))
    }

    /// Mark closed and drop every waiter so their receivers fail.
    fn shut(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }
}

/// Removes a request's waiter when the caller stops waiting, answered or not.
struct PendingGuard<'a> {
    shared: &'a Shared,
    key: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.shared.pending.lock() {
            pending.remove(&self.key);
        }
    }
}

/// Stdio transport - newline-delimited JSON-RPC to a child process
pub struct StdioTransport {
    shared: Arc<Shared>,
    child: Mutex<Option<Child>>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Launch `command args...` and attach to its stdio.
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        info!(command = %command, args = ?args, "Starting tool host process");

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::connection(format!("Failed to start {}: {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::connection("tool host stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::connection("tool host stdout unavailable"))?;

        Ok(Self::attach(stdout, stdin, Some(child)))
    }

    /// Attach to an already-open reader/writer pair.
    pub fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::attach(reader, writer, None)
    }

    fn attach<R, W>(reader: R, writer: W, child: Option<Child>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            writer: Mutex::new(Some(Box::new(writer))),
            pending: std::sync::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        let task = tokio::spawn(read_loop(reader, shared.clone()));

        Self {
            shared,
            child: Mutex::new(child),
            reader: std::sync::Mutex::new(Some(task)),
        }
    }
}

async fn read_loop<R>(reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Tool host closed its output");
                break;
            }
            Err(e) => {
                error!(error = %e, "Reading from tool host failed");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match Incoming::parse(line) {
            Ok(Incoming::Response(response)) => {
                let waiter = shared
                    .pending
                    .lock()
                    .ok()
                    .and_then(|mut pending| pending.remove(&response.id.to_string()));
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => warn!(id = %response.id, "Response for unknown request id"),
                }
            }
            Ok(Incoming::Request { id, method }) => {
                let reply = if method == "ping" {
                    McpResponse::success(id, json!({}))
                } else {
                    debug!(method = %method, "Rejecting server request");
                    McpResponse::failure(id, METHOD_NOT_FOUND, format!("Method not found: {}", method))
                };
                let sent = match serde_json::to_string(&reply) {
                    Ok(text) => shared.write_line(&text).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = sent {
                    warn!(error = %e, "Failed to answer server request");
                }
            }
            Ok(Incoming::Notification { method }) => {
                debug!(method = %method, "Tool host notification");
            }
            Err(e) => {
                warn!(error = %e, line = %line, "Ignoring unparseable line from tool host");
            }
        }
    }

    shared.shut();
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn request(&self, request: McpRequest) -> Result<McpResponse> {
        let key = request.id.to_string();
        let text = serde_json::to_string(&request)?;
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self
                .shared
                .pending
                .lock()
                .map_err(|_| Error::internal("pending map poisoned"))?;
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(Error::transport("tool host connection is closed"));
            }
            pending.insert(key.clone(), tx);
        }
        let _guard = PendingGuard {
            shared: &self.shared,
            key,
        };

        self.shared.write_line(&text).await?;

        rx.await.map_err(|_| {
            Error::transport(format!(
                "tool host closed before answering {}",
                request.method
            ))
        })
    }

    async fn notify(&self, notification: McpNotification) -> Result<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::transport("tool host connection is closed"));
        }
        let text = serde_json::to_string(&notification)?;
        self.shared.write_line(&text).await
    }

    async fn close(&self) -> Result<()> {
        // Dropping the writer closes the child's stdin.
        self.shared.writer.lock().await.take();
        self.shared.shut();

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(CHILD_EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!(status = %status, "Tool host exited"),
                Ok(Err(e)) => warn!(error = %e, "Waiting for tool host failed"),
                Err(_) => {
                    warn!("Tool host did not exit, killing it");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill tool host");
                    }
                }
            }
        }

        if let Some(task) = self.reader.lock().ok().and_then(|mut slot| slot.take()) {
            task.abort();
        }
        Ok(())
    }
}
