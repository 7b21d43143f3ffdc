//! HTTP API server for target provisioning.
//!
//! Exposes plan previews and provisioning runs over REST, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use provisioning::{ClientError, HttpResourceClient, InMemoryResourceClient, ResourceClient};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::provision::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/provision", post(routes::provision::provision))
        .route("/provision/plan", post(routes::provision::plan))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Reported by `/health` when no control plane URL is configured.
pub const IN_MEMORY: &str = "in-memory";

/// Creates the application state for the configured control plane.
///
/// Falls back to an in-memory control plane when no URL is configured.
pub fn create_default_state(config: &Config) -> Result<Arc<AppState>, ClientError> {
    let state = match config.client_config() {
        Some(client_config) => {
            tracing::info!(base_url = %client_config.base_url, "using HTTP control plane");
            let base_url = client_config.base_url.clone();
            let client: Arc<dyn ResourceClient> = Arc::new(HttpResourceClient::new(client_config)?);
            AppState::new(client, base_url)
        }
        None => {
            tracing::warn!("CONTROL_PLANE_URL not set, using in-memory control plane");
            AppState::new(Arc::new(InMemoryResourceClient::new()), IN_MEMORY)
        }
    };

    Ok(Arc::new(state))
}
