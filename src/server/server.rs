use std::sync::Arc;
use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;
use crate::server::handlers;
use crate::service::TokenService;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub token_service: Arc<TokenService>,
}

impl AppState {
    pub fn new (
        metrics: &Metrics,
        token_service: Arc<TokenService>,
    ) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            token_service,
        }
    }
}

/// All routes, CORS open to every origin and method.
pub fn build_router(state: AppState, settings_config: &SettingsConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/token", post(handlers::token))
        .route("/tokens/batch", post(handlers::tokens_batch))
        .route("/cache/clear", post(handlers::cache_clear))
        .route("/stats", get(handlers::stats))
        .merge(state.metrics_state.router(&settings_config.metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the configured address and serve until ctrl-c.
pub async fn start(
    settings_config: &SettingsConfig,
    token_service: Arc<TokenService>,
) -> Result<()> {
    let metrics = get_metrics().await;
    let state = AppState::new(metrics, token_service);
    let app = build_router(state, settings_config);

    let address = format!("{}:{}", settings_config.server.host, settings_config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!("listening on {}", address);

    metrics.up.set(1);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    metrics.up.set(0);
    info!("server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
