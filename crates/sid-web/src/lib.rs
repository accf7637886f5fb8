//! sid-web: HTTP boundary for the SID chat service
//!
//! - `POST /api/chat` → orchestrator run → `{response: {finalText, flags}}`
//! - `GET /api/health`, `GET /api/tools`
//! - static frontend build, when present

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
