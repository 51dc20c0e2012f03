//! HTTP server
//!
//! Wires the OpenAI-compatible routes, the chat management routes and the
//! file relay onto one axum router sharing an [`AppState`].

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::models::ModelRegistry;
use crate::openai::ModelList;
use crate::session::{FileSessionStore, SessionStore};
use crate::stream::LinkRewriter;
use crate::upstream::UpstreamClient;

use super::{chats, completions, files};

/// Shared application state for all handlers
pub struct AppState {
    /// Effective configuration
    pub config: Config,
    /// Client for the nexos.ai workspace
    pub upstream: UpstreamClient,
    /// Public model names and their handlers
    pub registry: ModelRegistry,
    /// Current chat pointer
    pub sessions: Arc<dyn SessionStore>,
    /// Link rewriter bound to the upstream base URL
    pub rewriter: LinkRewriter,
}

impl AppState {
    /// Build state around an explicit session store
    pub fn new(config: Config, sessions: Arc<dyn SessionStore>) -> Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        let rewriter = LinkRewriter::new(upstream.base_url())?;
        let registry = ModelRegistry::new(config.models.clone(), config.upstream.handler_id.clone());

        Ok(Self {
            config,
            upstream,
            registry,
            sessions,
            rewriter,
        })
    }

    /// Build state backed by the configured state file
    pub fn from_config(config: Config) -> Result<Self> {
        let sessions = Arc::new(FileSessionStore::new(
            config.session.state_file.clone(),
            config.upstream.chat_id.clone(),
        ));
        Self::new(config, sessions)
    }
}

/// The bridge server
pub struct BridgeServer {
    config: Config,
}

impl BridgeServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bind the listen address and serve until Ctrl+C or SIGTERM
    pub async fn serve(self) -> Result<()> {
        let listen_addr = self.config.server.listen_addr();
        let addr: SocketAddr = listen_addr
            .parse()
            .map_err(|e| BridgeError::Config(format!("Invalid listen address '{listen_addr}': {e}")))?;

        let state = Arc::new(AppState::from_config(self.config)?);

        tracing::info!("Starting nexos bridge on http://{addr}");
        tracing::info!("Models endpoint: http://{addr}/v1/models");
        tracing::info!("Chat endpoint: http://{addr}/v1/chat/completions");
        tracing::info!("Upstream: {}", state.upstream.base_url());
        tracing::info!(
            "Session state file: {}",
            state.config.session.state_file.display()
        );
        if state.config.upstream.disable_history {
            tracing::info!("Chat history continuation disabled");
        }
        match state.config.upstream.credential() {
            Some(cookie) => tracing::info!("Cookie credential configured ({} chars)", cookie.len()),
            None => tracing::warn!("NEXOS_COOKIES not configured; upstream calls will fail"),
        }

        let app = create_router(state);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Server(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| BridgeError::Server(format!("Server error: {e}")))?;

        tracing::info!("Bridge shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/models", get(models_handler))
        .route("/v1/chat/completions", post(completions::completions_handler))
        .route("/v1/chat/create", post(chats::create_handler))
        .route("/v1/chat/switch", post(chats::switch_handler))
        .route("/v1/chat/current", get(chats::current_handler))
        .route(
            "/v1/files/{chat_id}/{file_id}/download",
            get(files::download_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn models_handler(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(ModelList::new(state.registry.descriptors()))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
