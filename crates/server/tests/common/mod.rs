//! Common test utilities for API testing with a mocked media tool.
//!
//! This module provides a test fixture that creates an in-process server
//! backed by [`MockMediaTool`], so the HTTP surface can be exercised without
//! ffmpeg installed.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use convertino_core::{testing::MockMediaTool, JobQueue};
use convertino_server::api::{create_router, spawn_event_relay, WsBroadcaster, WsMessage};
use convertino_server::state::AppState;
use tokio::sync::broadcast;

/// Re-export fixtures for test convenience
pub use convertino_core::testing::fixtures;

/// Test fixture wiring the router to a queue driven by a mock tool.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/jobs", json!({
///         "jobs": [{ "input_path": "/in/a.mp4" }]
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    pub tool: MockMediaTool,
    pub queue: JobQueue,
    /// Messages as a WebSocket client would receive them.
    pub messages: broadcast::Receiver<WsMessage>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub fn new() -> Self {
        let tool = MockMediaTool::new();
        let queue = JobQueue::new(Arc::new(tool.clone()), Arc::new(fixtures::config()));

        let ws_broadcaster = WsBroadcaster::default();
        let messages = ws_broadcaster.subscribe();
        spawn_event_relay(&queue, ws_broadcaster.clone());

        let state = Arc::new(AppState::new(queue.clone(), ws_broadcaster));
        let router = create_router(state);

        Self {
            router,
            tool,
            queue,
            messages,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_empty(&self, uri: &str) -> TestResponse {
        self.request(Request::post(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.request(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    /// GET returning the raw body text.
    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse { status, body }
    }

    /// Waits for the next relayed message of the given type.
    pub async fn wait_for(&mut self, kind: &str) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.messages.recv())
                .await
                .expect("timed out waiting for message")
                .expect("relay closed");
            if msg.kind() == kind {
                return serde_json::to_value(&msg).unwrap();
            }
        }
    }
}
