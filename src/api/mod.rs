//! HTTP API server for the Voicelink gateway

pub mod health;
pub mod websocket;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::upstream::{GeminiLive, LiveEngine, SessionConfig};
use crate::{Config, Result};

/// Shared state for connection handlers
pub struct ApiState {
    /// The upstream conversational engine
    pub engine: Arc<dyn LiveEngine>,
    /// Per-session upstream configuration
    pub session: SessionConfig,
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Build a server for the given configuration, talking to the real
    /// Gemini Live API
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let engine = Arc::new(GeminiLive::new(
            config.api_key.clone(),
            config.upstream_host.clone(),
        ));
        Self::with_engine(engine, config)
    }

    /// Build a server over an arbitrary engine (tests inject fakes here)
    #[must_use]
    pub fn with_engine(engine: Arc<dyn LiveEngine>, config: &Config) -> Self {
        let state = Arc::new(ApiState {
            engine,
            session: SessionConfig {
                model: config.model.clone(),
                system_instruction: config.system_instruction.clone(),
            },
        });

        Self {
            state,
            port: config.port,
            static_dir: config.static_dir.clone(),
        }
    }

    /// Build the router with all routes
    fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(health::router())
            .merge(websocket::router(self.state.clone()));

        // Serve the web UI if configured
        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir = ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the server until the listener fails
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or serve
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind gateway: {e}")))?;

        tracing::info!(port = self.port, "gateway listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Transport(format!("gateway server error: {e}")))?;

        Ok(())
    }
}
