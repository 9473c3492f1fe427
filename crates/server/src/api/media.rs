//! Media inspection API handler.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use convertino_core::{MediaInfo, ToolError};

use super::handlers::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MediaInfoParams {
    pub path: PathBuf,
}

/// Media description plus display strings.
#[derive(Debug, Serialize)]
pub struct MediaInfoResponse {
    #[serde(flatten)]
    pub info: MediaInfo,
    pub resolution: Option<String>,
    pub display_size: String,
    pub display_duration: String,
    pub display_bitrate: Option<String>,
}

impl From<MediaInfo> for MediaInfoResponse {
    fn from(info: MediaInfo) -> Self {
        Self {
            resolution: info.resolution(),
            display_size: info.display_size(),
            display_duration: info.display_duration(),
            display_bitrate: info.display_bitrate(),
            info,
        }
    }
}

fn tool_error_status(e: &ToolError) -> StatusCode {
    match e {
        ToolError::NotFound { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ToolError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ToolError::Failed { .. } | ToolError::Parse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ToolError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET /api/v1/media/info?path=
pub async fn get_media_info(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MediaInfoParams>,
) -> Result<Json<MediaInfoResponse>, impl IntoResponse> {
    if params.path.as_os_str().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("path must not be empty")),
        ));
    }

    match state.queue().inspect(&params.path).await {
        Ok(info) => Ok(Json(MediaInfoResponse::from(info))),
        Err(e) => Err((tool_error_status(&e), Json(ErrorResponse::new(e.to_string())))),
    }
}
