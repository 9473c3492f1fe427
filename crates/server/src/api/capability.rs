//! Hardware capability API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use convertino_core::CapabilityReport;

use super::handlers::{queue_error, ErrorResponse};
use super::jobs::{into_requests, JobBody};
use crate::state::AppState;

/// Request body for the hardware confirmation check.
#[derive(Debug, Deserialize)]
pub struct ConfirmationBody {
    pub jobs: Vec<JobBody>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    /// True when the jobs ask for hardware that was reported unusable.
    pub required: bool,
}

/// GET /api/v1/capability
///
/// Cached result of the last capability probe.
pub async fn get_capability(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CapabilityReport>, impl IntoResponse> {
    match state.queue().capability().await {
        Some(report) => Ok(Json(report)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Capability probe has not run yet")),
        )),
    }
}

/// POST /api/v1/capability/test
///
/// Re-run the capability probe. Refused while a batch is running.
pub async fn test_capability(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CapabilityReport>, impl IntoResponse> {
    state
        .queue()
        .probe_capability()
        .await
        .map(Json)
        .map_err(queue_error)
}

/// POST /api/v1/hardware/confirmation
pub async fn hardware_confirmation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConfirmationBody>,
) -> Json<ConfirmationResponse> {
    let requests = into_requests(body.jobs, body.output_dir.as_deref());
    let required = state.queue().needs_hardware_confirmation(&requests).await;
    Json(ConfirmationResponse { required })
}
