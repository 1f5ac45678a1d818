//! HTTP execution surface for the MCP tool dispatch fabric.
//!
//! Exposes the process registry over REST-style endpoints so that the stdio
//! bridge, and any code the agent generates, can invoke tools with plain
//! authenticated HTTP. Batch endpoints take the tool identity in the body;
//! per-tool endpoints take it in the path.

pub mod auth;
pub mod handlers;
pub mod openapi;

use auth::AuthToken;
use axum::routing::post;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;

/// Errors from running the surface.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Binding or serving the listener failed.
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state for handlers and middleware.
#[derive(Clone)]
pub struct ApiState {
    /// The bearer token every caller must present.
    pub token: Arc<AuthToken>,
}

/// Builds the full router: batch endpoints, per-tool endpoints, bearer auth
/// on everything but preflight, permissive CORS outermost.
#[must_use]
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/mcp/execute", post(handlers::execute_mcp))
        .route("/api/custom/execute", post(handlers::execute_custom))
        .route("/api/virtual/execute", post(handlers::execute_virtual))
        .route("/tools/mcp/{server}/{tool}", post(handlers::tool_mcp))
        .route("/tools/custom/{tool}", post(handlers::tool_custom))
        .route("/tools/virtual/{tool}", post(handlers::tool_virtual))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind-and-serve wrapper around [`router`].
pub struct ApiServer {
    addr: SocketAddr,
    token: Arc<AuthToken>,
}

impl ApiServer {
    /// Creates a server with a freshly generated token.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            token: Arc::new(AuthToken::generate()),
        }
    }

    /// The token callers must present; export it to the bridge environment.
    #[must_use]
    pub fn token(&self) -> &str {
        self.token.as_str()
    }

    /// Serves until ctrl-c.
    pub async fn serve(self) -> Result<(), ApiError> {
        let state = ApiState {
            token: Arc::clone(&self.token),
        };
        let app = router(state);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(event = "api_listening", addr = %self.addr, "execution surface listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!(event = "api_shutdown", "shutting down execution surface");
            })
            .await?;
        Ok(())
    }
}
