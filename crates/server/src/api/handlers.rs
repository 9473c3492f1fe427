use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use convertino_core::{Config, QueueError};

use crate::metrics::encode_metrics;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Maps a queue refusal to its HTTP status.
pub fn queue_error(e: QueueError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        QueueError::EmptyBatch => StatusCode::BAD_REQUEST,
        QueueError::ToolMissing { .. } => StatusCode::SERVICE_UNAVAILABLE,
        QueueError::Busy => StatusCode::CONFLICT,
        QueueError::JobNotFound(_) => StatusCode::NOT_FOUND,
    };
    (status, Json(ErrorResponse::new(e.to_string())))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<Config> {
    Json(state.config().clone())
}

/// GET /metrics
///
/// Prometheus text exposition.
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
