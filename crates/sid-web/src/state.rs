//! Application State
//!
//! Shared by every handler behind an `Arc`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sid_chat::Orchestrator;
use sid_mcp::ToolRegistry;

/// Application state shared across all handlers
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Same registry the orchestrator uses; read for `/api/tools`
    pub registry: Arc<dyn ToolRegistry>,
    /// Upper bound on one `/api/chat` run
    pub request_timeout: Duration,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, request_timeout: Duration) -> Self {
        let registry = orchestrator.registry().clone();
        Self {
            orchestrator,
            registry,
            request_timeout,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
