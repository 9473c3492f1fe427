//! Conversion job API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use convertino_core::{BatchMode, ConversionRequest, EncoderProfile, QueueStatus, SubmitOptions};

use super::handlers::queue_error;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// One job in a submission.
#[derive(Debug, Deserialize)]
pub struct JobBody {
    pub input_path: PathBuf,
    /// Derived from the input and container when omitted.
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub profile: EncoderProfile,
}

/// Request body for submitting a batch.
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub jobs: Vec<JobBody>,
    /// Keep going after each job instead of stopping after the first.
    #[serde(default)]
    pub batch: bool,
    /// Skip the software fallback when hardware is reported unusable.
    #[serde(default)]
    pub force_hardware: bool,
    /// Directory for derived output paths.
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_ids: Vec<String>,
    pub mode: BatchMode,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct JobLogResponse {
    pub job_id: String,
    pub lines: Vec<String>,
}

/// Turns request bodies into conversion requests, deriving missing outputs.
pub fn into_requests(jobs: Vec<JobBody>, output_dir: Option<&std::path::Path>) -> Vec<ConversionRequest> {
    jobs.into_iter()
        .map(|job| match job.output_path {
            Some(output) => ConversionRequest::new(job.input_path, output, job.profile),
            None => ConversionRequest::derived(job.input_path, output_dir, job.profile),
        })
        .collect()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/jobs
///
/// Start a new single or batch run.
pub async fn submit_jobs(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<SubmitResponse>), impl IntoResponse> {
    let mode = BatchMode::from(body.batch);
    let requests = into_requests(body.jobs, body.output_dir.as_deref());
    let options = SubmitOptions {
        force_hardware: body.force_hardware,
    };

    match state.queue().submit(requests, mode, options).await {
        Ok(job_ids) => {
            let total = job_ids.len();
            Ok((
                StatusCode::ACCEPTED,
                Json(SubmitResponse {
                    job_ids,
                    mode,
                    total,
                }),
            ))
        }
        Err(e) => Err(queue_error(e)),
    }
}

/// GET /api/v1/jobs
///
/// Status of the current or last batch.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<QueueStatus> {
    Json(state.queue().status().await)
}

/// DELETE /api/v1/jobs
///
/// Cancel the running batch. Returns after the running process has exited.
pub async fn cancel_jobs(State(state): State<Arc<AppState>>) -> Json<CancelResponse> {
    let cancelled = state.queue().cancel_all().await;
    if cancelled {
        info!("Batch cancelled via API");
    }
    Json(CancelResponse { cancelled })
}

/// GET /api/v1/jobs/{id}/log
pub async fn get_job_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobLogResponse>, impl IntoResponse> {
    match state.queue().job_log(&id).await {
        Ok(lines) => Ok(Json(JobLogResponse { job_id: id, lines })),
        Err(e) => Err(queue_error(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convertino_core::{CodecFamily, Container};
    use std::path::Path as FsPath;

    #[test]
    fn test_into_requests_derives_missing_output() {
        let jobs = vec![
            JobBody {
                input_path: PathBuf::from("/in/a.avi"),
                output_path: None,
                profile: EncoderProfile::default(),
            },
            JobBody {
                input_path: PathBuf::from("/in/b.avi"),
                output_path: Some(PathBuf::from("/elsewhere/b.mkv")),
                profile: EncoderProfile::default(),
            },
        ];

        let requests = into_requests(jobs, Some(FsPath::new("/out")));
        assert_eq!(requests[0].output_path, PathBuf::from("/out/a.mp4"));
        assert_eq!(requests[1].output_path, PathBuf::from("/elsewhere/b.mkv"));
    }

    #[test]
    fn test_submit_body_defaults() {
        let body: SubmitBody =
            serde_json::from_str(r#"{"jobs":[{"input_path":"/in/a.mp4"}]}"#).unwrap();
        assert!(!body.batch);
        assert!(!body.force_hardware);
        assert_eq!(body.jobs[0].profile.codec_family, CodecFamily::Software);
        assert_eq!(body.jobs[0].profile.container, Container::Mp4);
    }

    #[test]
    fn test_submit_body_hardware_profile() {
        let body: SubmitBody = serde_json::from_str(
            r#"{"jobs":[{"input_path":"/in/a.mp4","profile":{"codec_family":"hardware","container":"mkv"}}],"batch":true}"#,
        )
        .unwrap();
        assert!(body.batch);
        assert!(body.jobs[0].profile.wants_hardware());
        assert_eq!(body.jobs[0].profile.container, Container::Mkv);
    }
}
