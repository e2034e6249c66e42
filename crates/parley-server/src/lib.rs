//! HTTP streaming server for Parley.
//!
//! Exposes the tool orchestrator over HTTP:
//!
//! - `POST /api/chat/stream`: one generation turn as Server-Sent Events
//! - `POST /api/mcp/call`: the tool-invocation proxy
//! - `GET /health`
//!
//! # Example
//!
//! ```ignore
//! use parley_server::{AppState, Server, ServerConfig};
//!
//! let state = AppState::new(orchestrator, Arc::new(McpGateway::new()?), ServerConfig::new());
//! Server::from_state(state).run().await?;
//! ```

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{ErrorResponse, Result, ServerError};
pub use state::AppState;

use std::net::SocketAddr;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The Parley HTTP server.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        use axum::routing::post;

        let mut router = Router::new()
            .merge(routes::health_routes())
            .route("/api/chat/stream", post(routes::chat_stream_handler))
            .route("/api/mcp/call", post(routes::mcp_call_handler))
            .layer(DefaultBodyLimit::max(self.state.config.max_body_size));

        if self.state.config.cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server on the configured address.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address.
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let router = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

        info!(addr = %addr, "Parley server listening");

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}
