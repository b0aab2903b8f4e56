//! RAG chat - document search front-end for a hosted AI agent
//!
//! Serves a single chat page. Each browser session provisions its own
//! remote agent bound to an AI Search index and forwards questions to it.

mod agent;
mod api;
mod config;
mod controller;
mod runtime;
mod state_machine;

use agent::HttpAgentProvider;
use api::{create_router, AppState};
use config::{AgentSpec, ProjectConfig, ServerConfig};
use runtime::RuntimeManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ragchat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let project = match ProjectConfig::from_env() {
        Ok(project) => project,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let server = ServerConfig::from_env();
    tracing::info!(endpoint = %project.project_endpoint, "Using AI project");

    let provider = Arc::new(HttpAgentProvider::new(project)?);
    let runtime = Arc::new(RuntimeManager::new(provider, AgentSpec::default()));
    let reaper = runtime.spawn_idle_reaper(server.session_idle);
    let state = AppState::new(runtime.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state).layer(cors).layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], server.port));
    tracing::info!("RAG chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Remote agents must not outlive the server
    reaper.abort();
    runtime.end_all().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
