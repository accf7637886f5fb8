//! Chat API Handler

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use sid_core::{ChatMessage, Conversation, WireResponse};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: WireResponse,
}

/// POST /api/chat - Run the conversation and return the UI-facing answer
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = match payload {
        Ok(Json(request)) if !request.messages.is_empty() => request,
        Ok(_) => {
            warn!("Chat request with no messages");
            return Err(ApiError::invalid_messages());
        }
        Err(rejection) => {
            warn!(error = %rejection, "Malformed chat request");
            return Err(ApiError::invalid_messages());
        }
    };

    info!(messages = request.messages.len(), "Chat request");
    let conversation = Conversation::from_messages(&request.messages);

    match tokio::time::timeout(state.request_timeout, state.orchestrator.run(conversation)).await {
        Ok(Ok(result)) => Ok(Json(ChatResponse {
            response: result.to_wire(),
        })),
        Ok(Err(e)) => {
            error!(error = %e, "Chat processing failed");
            Err(e.into())
        }
        Err(_) => {
            error!(
                timeout_secs = state.request_timeout.as_secs(),
                "Chat processing timed out"
            );
            Err(ApiError::timeout(state.request_timeout))
        }
    }
}
