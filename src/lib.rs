//! Asynchronous photo-processing pipeline.
//!
//! This library provides the core of the photo-pipeline service: an
//! in-memory job queue with a bounded-concurrency scheduler, an in-process
//! face detection and crop engine, and an out-of-process delegate for
//! external detector binaries.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{routing::get, routing::post, Router};

use app_state::AppState;

/// Build the API router over shared state.
///
/// Kept separate from `main` so tests can drive the HTTP surface
/// in-process.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/jobs", post(routes::jobs::submit_job))
        .route("/api/v1/jobs/bulk", post(routes::jobs::submit_jobs_bulk))
        .route("/api/v1/jobs/{job_id}", get(routes::jobs::get_job_status))
        .route("/api/v1/queue/stats", get(routes::jobs::queue_stats))
        .with_state(state)
}

/// Convenience used by `main` and the integration tests: a queue, the
/// state wrapping it, and the router.
pub fn build_app() -> (Arc<services::queue::JobQueue>, Router) {
    let queue = Arc::new(services::queue::JobQueue::new());
    let state = AppState::new(Arc::clone(&queue));
    (queue, api_router(state))
}
