//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers;
use crate::state::AppState;

/// Create the complete router
///
/// Static files come from `static_dir` when it exists; otherwise `GET /`
/// answers with a plain status line.
pub fn create_router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route("/chat", post(handlers::chat::chat_handler))
        .route("/tools", get(handlers::tools::list_tools_handler))
        .with_state(state);

    let mut router = Router::new().nest("/api", api_routes);

    match static_dir {
        Some(dir) if dir.is_dir() => {
            info!(dir = %dir.display(), "Serving static files");
            router = router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
        }
        other => {
            if let Some(dir) = other {
                warn!(dir = %dir.display(), "Static directory not found; frontend disabled");
            }
            router = router.route("/", get(handlers::health::root_handler));
        }
    }

    router.layer(cors).layer(TraceLayer::new_for_http())
}
