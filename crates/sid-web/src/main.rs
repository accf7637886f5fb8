//! sid-server: Main Entry Point
//!
//! Connects to the tool host, wires the Anthropic completion client and the
//! orchestrator together, and serves the chat API.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sid_chat::{Orchestrator, OrchestratorConfig};
use sid_core::config::{load_env_file, load_environment};
use sid_core::ServiceConfig;
use sid_llm::{AnthropicClient, RetryPolicy, RetryingCompletionService};
use sid_mcp::{McpClient, ToolRegistry};
use sid_web::{create_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "sid-server")]
#[command(about = "Chat assistant API backed by an MCP tool host and Claude")]
struct Args {
    /// Bind address (host:port); defaults to 0.0.0.0:$PORT
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Environment file to load before reading configuration
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Tool rounds allowed per chat request
    #[arg(long)]
    max_tool_rounds: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_source = match &args.env_file {
        Some(path) => load_env_file(path),
        None => load_environment(),
    };

    // Initialize logging with environment filter
    tracing_subscriber::registry()
        .with(fmt::layer().compact())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sid_web=debug")),
        )
        .init();

    match (&args.env_file, env_source) {
        (_, Some(path)) => info!("Loaded environment from {}", path),
        (Some(path), None) => warn!("Environment file not found: {}", path.display()),
        (None, None) => {}
    }

    let mut config = ServiceConfig::from_env().context("Invalid configuration")?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(rounds) = args.max_tool_rounds {
        config.max_tool_rounds = rounds;
    }

    // The server only accepts requests once the tool host is reachable.
    let registry: Arc<dyn ToolRegistry> = match McpClient::connect(&config.tool_host).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(tool_host = %config.tool_host, error = %e, "Failed to connect to tool host");
            return Err(e).context("Tool host connection failed");
        }
    };
    info!("✅ Loaded {} tools", registry.tools().len());

    let anthropic = AnthropicClient::from_settings(&config.completion);
    info!("✅ Completion model: {}", anthropic.model());
    let completion = Arc::new(RetryingCompletionService::new(anthropic, RetryPolicy::default()));

    let orchestrator = Arc::new(Orchestrator::new(
        completion,
        registry.clone(),
        OrchestratorConfig::from(&config),
    ));
    let state = Arc::new(AppState::new(orchestrator, config.request_timeout));
    let app = create_router(state, Some(config.static_dir.as_path()));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Server listening on http://{}", config.bind);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(e) = registry.close().await {
        warn!(error = %e, "Tool host did not close cleanly");
    }
    served?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
