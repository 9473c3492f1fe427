//! HTTP API tests against an in-process router and a mocked media tool.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, TestFixture};
use convertino_core::testing::{MockRun, MockSynthetic};

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_reports_tool_settings() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/config").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["tool"]["hardware_encoder"], "h264_nvenc");
    assert_eq!(response.body["tool"]["software_encoder"], "libx264");
}

#[tokio::test]
async fn test_submit_empty_batch_is_rejected() {
    let fixture = TestFixture::new();
    let response = fixture.post("/api/v1/jobs", json!({ "jobs": [] })).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_submit_without_tool_is_unavailable() {
    let fixture = TestFixture::new();
    fixture.tool.set_installed(false).await;

    let response = fixture
        .post("/api/v1/jobs", json!({ "jobs": [{ "input_path": "/in/a.mp4" }] }))
        .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(fixture.tool.spawned().await.is_empty());
}

#[tokio::test]
async fn test_submit_runs_to_completion() {
    let mut fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({
                "jobs": [{ "input_path": "/in/a.avi" }],
                "output_dir": "/out"
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["mode"], "single");
    let job_id = response.body["job_ids"][0].as_str().unwrap().to_string();

    let started = fixture.wait_for("job_started").await;
    assert_eq!(started["job_id"], job_id.as_str());
    assert_eq!(started["index"], 1);
    assert_eq!(started["total"], 1);

    let finished = fixture.wait_for("batch_finished").await;
    assert_eq!(finished["succeeded"], 1);
    assert_eq!(finished["failed"], 0);

    let status = fixture.get("/api/v1/jobs").await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["active"], false);
    assert_eq!(status.body["completed"], 1);
    assert_eq!(status.body["jobs"][0]["status"], "completed");
    assert_eq!(status.body["jobs"][0]["percent"], 100);
    assert_eq!(status.body["jobs"][0]["output_path"], "/out/a.mp4");
}

#[tokio::test]
async fn test_batch_mode_continues_after_failure() {
    let mut fixture = TestFixture::new();
    fixture
        .tool
        .set_run(
            "/in/bad.mp4",
            MockRun::failure(vec!["Unknown encoder 'libx264'".to_string()], 1),
        )
        .await;

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({
                "jobs": [
                    { "input_path": "/in/bad.mp4" },
                    { "input_path": "/in/good.mp4" }
                ],
                "batch": true
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let failed = fixture.wait_for("job_failed").await;
    assert_eq!(failed["error_kind"], "encoder_missing");

    let finished = fixture.wait_for("batch_finished").await;
    assert_eq!(finished["completed"], 2);
    assert_eq!(finished["succeeded"], 1);
    assert_eq!(finished["failed"], 1);
}

#[tokio::test]
async fn test_busy_then_cancel() {
    let mut fixture = TestFixture::new();
    fixture.tool.set_default_run(MockRun::hang(vec![])).await;

    let first = fixture
        .post("/api/v1/jobs", json!({ "jobs": [{ "input_path": "/in/a.mp4" }] }))
        .await;
    assert_eq!(first.status, StatusCode::ACCEPTED);
    fixture.wait_for("job_started").await;

    let second = fixture
        .post("/api/v1/jobs", json!({ "jobs": [{ "input_path": "/in/b.mp4" }] }))
        .await;
    assert_eq!(second.status, StatusCode::CONFLICT);

    let cancel = fixture.delete("/api/v1/jobs").await;
    assert_eq!(cancel.status, StatusCode::OK);
    assert_eq!(cancel.body["cancelled"], true);
    assert_eq!(fixture.tool.kill_count().await, 1);
    assert_eq!(fixture.tool.running_count().await, 0);

    let cancelled = fixture.wait_for("batch_cancelled").await;
    assert_eq!(cancelled["completed"], 0);

    let status = fixture.get("/api/v1/jobs").await;
    assert_eq!(status.body["active"], false);
    assert_eq!(status.body["jobs"][0]["status"], "cancelled");

    let again = fixture.delete("/api/v1/jobs").await;
    assert_eq!(again.body["cancelled"], false);
}

#[tokio::test]
async fn test_job_log() {
    let mut fixture = TestFixture::new();

    let response = fixture
        .post("/api/v1/jobs", json!({ "jobs": [{ "input_path": "/in/a.mp4" }] }))
        .await;
    let job_id = response.body["job_ids"][0].as_str().unwrap().to_string();
    fixture.wait_for("batch_finished").await;

    let log = fixture.get(&format!("/api/v1/jobs/{}/log", job_id)).await;
    assert_eq!(log.status, StatusCode::OK);
    assert_eq!(log.body["job_id"], job_id.as_str());
    let first_line = log.body["lines"][0].as_str().unwrap();
    assert!(first_line.starts_with("$ "));

    let missing = fixture.get("/api/v1/jobs/no-such-job/log").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_capability_probe_and_cache() {
    let fixture = TestFixture::new();

    let before = fixture.get("/api/v1/capability").await;
    assert_eq!(before.status, StatusCode::NOT_FOUND);

    let tested = fixture.post_empty("/api/v1/capability/test").await;
    assert_eq!(tested.status, StatusCode::OK);
    assert_eq!(tested.body["available"], true);
    assert_eq!(tested.body["encoder"], "h264_nvenc");

    let cached = fixture.get("/api/v1/capability").await;
    assert_eq!(cached.status, StatusCode::OK);
    assert_eq!(cached.body["available"], true);
}

#[tokio::test]
async fn test_capability_test_refused_while_running() {
    let mut fixture = TestFixture::new();
    fixture.tool.set_default_run(MockRun::hang(vec![])).await;

    fixture
        .post("/api/v1/jobs", json!({ "jobs": [{ "input_path": "/in/a.mp4" }] }))
        .await;
    fixture.wait_for("job_started").await;

    let tested = fixture.post_empty("/api/v1/capability/test").await;
    assert_eq!(tested.status, StatusCode::CONFLICT);

    fixture.delete("/api/v1/jobs").await;
}

#[tokio::test]
async fn test_hardware_confirmation() {
    let fixture = TestFixture::new();
    fixture
        .tool
        .set_synthetic(MockSynthetic::Fail {
            exit_code: 1,
            stderr: "Cannot load libcuda.so.1".to_string(),
        })
        .await;

    let software = fixture
        .post(
            "/api/v1/hardware/confirmation",
            json!({ "jobs": [{ "input_path": "/in/a.mp4" }] }),
        )
        .await;
    assert_eq!(software.status, StatusCode::OK);
    assert_eq!(software.body["required"], false);

    let hardware = fixture
        .post(
            "/api/v1/hardware/confirmation",
            json!({ "jobs": [{
                "input_path": "/in/a.mp4",
                "profile": { "codec_family": "hardware" }
            }] }),
        )
        .await;
    assert_eq!(hardware.status, StatusCode::OK);
    assert_eq!(hardware.body["required"], true);

    let cached = fixture.get("/api/v1/capability").await;
    assert_eq!(cached.body["available"], false);
}

#[tokio::test]
async fn test_media_info() {
    let fixture = TestFixture::new();
    fixture
        .tool
        .set_media_info("/in/movie.mp4", fixtures::probe_json(5400.0, 1_610_612_736))
        .await;

    let response = fixture.get("/api/v1/media/info?path=/in/movie.mp4").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["file_name"], "movie.mp4");
    assert_eq!(response.body["video_codec"], "h264");
    assert_eq!(response.body["resolution"], "1920x1080");
    assert_eq!(response.body["display_size"], "1.50 GB");
    assert_eq!(response.body["display_duration"], "01:30:00.000");
    assert_eq!(response.body["display_bitrate"], "4500 Kbps");

    let missing = fixture.get("/api/v1/media/info?path=/in/nope.mp4").await;
    assert_eq!(missing.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("convertino_http_requests_total"));
    assert!(body.contains("convertino_hardware_fallbacks_total"));
}
