//! Tool API Handlers

use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::state::AppState;

/// GET /api/tools - Cached tool catalog of the connected tool host
pub async fn list_tools_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let tools = state.registry.tools();

    Json(json!({
        "count": tools.len(),
        "tools": tools,
    }))
}
