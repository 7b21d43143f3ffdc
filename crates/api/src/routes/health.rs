//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::provision::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Control plane the orchestrator talks to (a base URL or `in-memory`).
    pub control_plane: String,
}

/// GET /health: returns service health and the configured control plane.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        control_plane: state.control_plane.clone(),
    })
}
