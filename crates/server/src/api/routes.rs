use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{capability, handlers, jobs, media, middleware::metrics_middleware, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Jobs
        .route("/jobs", post(jobs::submit_jobs))
        .route("/jobs", get(jobs::get_status))
        .route("/jobs", delete(jobs::cancel_jobs))
        .route("/jobs/{id}/log", get(jobs::get_job_log))
        // Hardware capability
        .route("/capability", get(capability::get_capability))
        .route("/capability/test", post(capability::test_capability))
        .route("/hardware/confirmation", post(capability::hardware_confirmation))
        // Media inspection
        .route("/media/info", get(media::get_media_info))
        // Live events
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .route("/metrics", get(handlers::metrics))
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
