//! HTTP server setup and configuration.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::{Config, CorsConfig};
use crate::upstream::DeepSeekClient;

/// Shared application state.
///
/// Read-only after startup; cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub client: DeepSeekClient,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build state around a fresh HTTP client.
    pub fn new(config: Config) -> reqwest::Result<Self> {
        let config = Arc::new(config);
        let http_client = DeepSeekClient::build_http_client()?;
        Ok(Self {
            client: DeepSeekClient::new(http_client, config.clone()),
            config,
        })
    }
}

/// Build the CORS layer from configuration.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<axum::http::HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<axum::http::HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    let prefix = state.config.api.prefix.clone();
    let cors = build_cors_layer(&state.config.cors);

    let api = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chat/stream", post(handlers::chat_stream))
        .route("/health", get(handlers::health))
        .route("/openapi.json", get(handlers::openapi_json))
        .route("/docs", get(handlers::docs));

    Router::new()
        .route("/", get(handlers::root))
        .nest(&prefix, api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();
    let prefix = config.api.prefix.clone();

    let state = AppState::new(config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, prefix = %prefix, "Starting deepseek-proxy server");

    axum::serve(listener, app).await?;

    Ok(())
}
