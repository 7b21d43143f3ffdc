//! Provisioning endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::RunId;
use provisioning::{
    CancelSignal, ProvisionError, ProvisioningIntent, ProvisioningOrchestrator,
    ProvisioningResult, ResolvedReuseIds, ResourceClient, RunState, StepKind, StepPlan,
    build_plan,
};
use serde::Serialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: ProvisioningOrchestrator,
    pub control_plane: String,
}

impl AppState {
    pub fn new(client: Arc<dyn ResourceClient>, control_plane: impl Into<String>) -> Self {
        Self {
            orchestrator: ProvisioningOrchestrator::new(client),
            control_plane: control_plane.into(),
        }
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct PlanResponse {
    pub steps: Vec<StepKind>,
    pub plan: StepPlan,
    pub reused: ResolvedReuseIds,
}

#[derive(Serialize)]
pub struct ProvisionResponse {
    pub run_id: RunId,
    pub state: RunState,
    pub result: ProvisioningResult,
}

// -- Handlers --

/// POST /provision/plan: validate an intent and return the steps it would run.
#[tracing::instrument(skip(intent))]
pub async fn plan(Json(intent): Json<ProvisioningIntent>) -> Result<Json<PlanResponse>, ApiError> {
    let (plan, reused) = build_plan(&intent).map_err(ProvisionError::from)?;
    metrics::counter!("api_plan_previews_total").increment(1);

    Ok(Json(PlanResponse {
        steps: plan.kinds(),
        plan,
        reused,
    }))
}

/// POST /provision: run the orchestrator for an intent.
#[tracing::instrument(skip(state, intent), fields(mode = %intent.target_mode))]
pub async fn provision(
    State(state): State<Arc<AppState>>,
    Json(intent): Json<ProvisioningIntent>,
) -> Result<(StatusCode, Json<ProvisionResponse>), ApiError> {
    let (plan, resolved) = build_plan(&intent).map_err(ProvisionError::from)?;

    let outcome = state
        .orchestrator
        .execute(&plan, &resolved, &CancelSignal::never())
        .await;
    let run_id = outcome.run.id();
    let result = outcome.result?;

    tracing::info!(%run_id, target_id = %result.target_id, "provision request completed");

    Ok((
        StatusCode::CREATED,
        Json(ProvisionResponse {
            run_id,
            state: outcome.run.state(),
            result,
        }),
    ))
}
