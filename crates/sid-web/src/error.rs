//! Mapping of service errors onto HTTP responses

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use sid_core::Error;
use std::time::Duration;

/// Error body returned by the API: `{error, details}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<String>,
    pub retry_after: Option<Duration>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
            retry_after: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn invalid_messages() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid message format")
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, "Request timed out")
            .with_details(format!("No answer within {} seconds", after.as_secs()))
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::RateLimited { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Authentication(_)
            | Error::Upstream { .. }
            | Error::Transport(_)
            | Error::Connection(_)
            | Error::UnknownTool(_)
            | Error::ToolInvocation { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            error: "Failed to process query".to_string(),
            details: Some(e.to_string()),
            retry_after: e.retry_after(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        let mut response = (self.status, Json(body)).into_response();

        if self.status == StatusCode::SERVICE_UNAVAILABLE {
            // Whole seconds, rounded up.
            let secs = self.retry_after.map(|d| d.as_secs_f64().ceil() as u64).unwrap_or(1);
            if let Ok(value) = HeaderValue::from_str(&secs.max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
