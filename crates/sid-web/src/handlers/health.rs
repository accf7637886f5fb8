//! Health Check Handler

use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub tools: usize,
    pub timestamp: String,
}

/// GET /api/health - Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        tools: state.registry.tools().len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET / when no frontend build is being served
pub async fn root_handler() -> &'static str {
    "API server is running. Frontend build not available."
}
