//! Request accounting for the HTTP API.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::metrics::{
    normalize_path, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION,
};

/// Label a request with its route template.
///
/// Routed requests use the template they matched, so every job log request
/// lands under `/api/v1/jobs/{id}/log`. Unrouted requests fall back to the
/// collapsed raw path.
fn route_label(request: &Request<Body>) -> String {
    match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => normalize_path(request.uri().path()),
    }
}

/// Keeps the in-flight gauge balanced even if the handler future is dropped.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        HTTP_REQUESTS_IN_FLIGHT.inc();
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        HTTP_REQUESTS_IN_FLIGHT.dec();
    }
}

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    // The upgrade request stays open for the whole socket lifetime.
    if request.method() == Method::GET && request.uri().path().ends_with("/ws") {
        return next.run(request).await;
    }

    let started = Instant::now();
    let method = request.method().as_str().to_string();
    let route = route_label(&request);

    let response = {
        let _in_flight = InFlight::enter();
        next.run(request).await
    };

    let status = response.status().as_u16().to_string();
    let labels = [method.as_str(), route.as_str(), status.as_str()];
    HTTP_REQUEST_DURATION
        .with_label_values(&labels)
        .observe(started.elapsed().as_secs_f64());
    HTTP_REQUESTS_TOTAL.with_label_values(&labels).inc();

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn job_log() -> &'static str {
        "log"
    }

    fn app() -> Router {
        let jobs = Router::new().route("/jobs/{id}/log", get(job_log));
        Router::new()
            .nest("/api/v1", jobs)
            .layer(middleware::from_fn(metrics_middleware))
    }

    fn total(route: &str, status: &str) -> u64 {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", route, status])
            .get()
    }

    async fn get_uri(uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_job_log_requests_share_one_route_label() {
        let route = "/api/v1/jobs/{id}/log";
        let before = total(route, "200");

        assert_eq!(get_uri("/api/v1/jobs/first/log").await, StatusCode::OK);
        assert_eq!(
            get_uri("/api/v1/jobs/6f1c2e7a-0000-4000-8000-000000000001/log").await,
            StatusCode::OK
        );

        assert_eq!(total(route, "200"), before + 2);
    }

    #[test]
    fn test_unrouted_job_path_is_collapsed() {
        let request = Request::builder()
            .uri("/api/v1/jobs/whatever/missing")
            .body(Body::empty())
            .unwrap();
        assert_eq!(route_label(&request), "/api/v1/jobs/{id}/missing");
    }
}
