//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use provisioning::ProvisionError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Planning or the provisioning run failed.
    Provision(ProvisionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Provision(err) => provision_error_to_response(err),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn provision_error_to_response(err: ProvisionError) -> (StatusCode, serde_json::Value) {
    let status = match &err {
        ProvisionError::PlanInvalid(_) => StatusCode::BAD_REQUEST,
        ProvisionError::StepFailed { .. } => StatusCode::BAD_GATEWAY,
        ProvisionError::Cancelled { .. } => StatusCode::CONFLICT,
        ProvisionError::Incomplete { .. } => {
            tracing::error!(error = %err, "provisioning finished incomplete");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let mut body = serde_json::json!({ "error": err.to_string() });
    if let ProvisionError::StepFailed { kind, cause, .. } = &err {
        body["failed_step"] = serde_json::json!(kind);
        body["cause"] = serde_json::json!(cause.to_string());
    }
    if err.rollback_report().is_some() {
        body["orphaned"] = serde_json::json!(err.orphans());
    }
    (status, body)
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        ApiError::Provision(err)
    }
}
