//! HTTP API server for the companion gateway

pub mod chat;
pub mod health;
pub mod websocket;

use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::ChatService;
use crate::db::SessionStore;
use crate::inner_life::ReflectionService;
use crate::live::ConnectionRegistry;
use crate::{Error, Result};

/// Default port for the API server
pub const DEFAULT_PORT: u16 = crate::config::DEFAULT_PORT;

/// Shared state for API handlers
pub struct ApiState {
    pub store: Arc<dyn SessionStore>,
    pub registry: ConnectionRegistry,
    pub chat: Arc<ChatService>,
    pub reflection: Arc<ReflectionService>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Map a gateway error onto a status and JSON body
pub(crate) fn error_response(err: &Error) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match err {
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        Error::InvalidFrame(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        Error::Model(_) => (StatusCode::BAD_GATEWAY, "model_error"),
        Error::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: err.to_string(),
            },
        }),
    )
}

/// Builder for the API server
pub struct ApiServerBuilder {
    store: Arc<dyn SessionStore>,
    registry: ConnectionRegistry,
    chat: Arc<ChatService>,
    reflection: Arc<ReflectionService>,
    port: u16,
    cors_origins: Vec<String>,
}

impl ApiServerBuilder {
    /// Create a builder with the required collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        registry: ConnectionRegistry,
        chat: Arc<ChatService>,
        reflection: Arc<ReflectionService>,
    ) -> Self {
        Self {
            store,
            registry,
            chat,
            reflection,
            port: DEFAULT_PORT,
            cors_origins: vec!["*".to_string()],
        }
    }

    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Restrict CORS to the given origins; `*` allows any
    #[must_use]
    pub fn cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let state = Arc::new(ApiState {
            store: self.store,
            registry: self.registry,
            chat: self.chat,
            reflection: self.reflection,
        });

        ApiServer {
            state,
            port: self.port,
            cors_origins: self.cors_origins,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    cors_origins: Vec<String>,
}

impl ApiServer {
    fn cors(&self) -> CorsLayer {
        let origin = if self.cors_origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            let origins: Vec<HeaderValue> = self
                .cors_origins
                .iter()
                .filter_map(|o| match o.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any)
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .nest("/api", chat::router(Arc::clone(&self.state)))
            .nest("/ws", websocket::router(Arc::clone(&self.state)))
            .merge(health::router())
            .layer(self.cors())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}
