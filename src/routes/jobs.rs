use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{
    BulkSubmitRequest, BulkSubmitResponse, ErrorResponse, JobStatusResponse, QueueStatsResponse,
    SubmitRequest, SubmitResponse,
};
use crate::models::job::JobOptions;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message }))
}

/// POST /api/v1/jobs — enqueue one processing job.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    request
        .validate()
        .map_err(|e| bad_request(format!("invalid payload: {e}")))?;

    let options = request
        .options
        .map(|o| o.into_job_options())
        .unwrap_or_default();

    let job = state
        .queue
        .submit(request.kind, request.payload.into_payload(), options);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job.id,
            state: job.state,
            message: "job queued for processing".to_string(),
        }),
    ))
}

/// POST /api/v1/jobs/bulk — enqueue many jobs of one kind.
///
/// Validation is all-or-nothing: if any payload is invalid the whole
/// request is rejected, naming the offending index, and nothing is queued.
pub async fn submit_jobs_bulk(
    State(state): State<AppState>,
    Json(request): Json<BulkSubmitRequest>,
) -> Result<(StatusCode, Json<BulkSubmitResponse>), ApiError> {
    request
        .validate()
        .map_err(|e| bad_request(format!("invalid request: {e}")))?;

    for (index, payload) in request.payloads.iter().enumerate() {
        payload
            .validate()
            .map_err(|e| bad_request(format!("invalid payload at index {index}: {e}")))?;
    }

    let options = request
        .options
        .map(|o| o.into_job_options())
        .unwrap_or_else(JobOptions::default);

    let job_ids: Vec<Uuid> = request
        .payloads
        .into_iter()
        .map(|payload| {
            state
                .queue
                .submit(request.kind, payload.into_payload(), options.clone())
                .id
        })
        .collect();

    let count = job_ids.len();
    Ok((
        StatusCode::ACCEPTED,
        Json(BulkSubmitResponse {
            job_ids,
            count,
            message: "bulk jobs queued for processing".to_string(),
        }),
    ))
}

/// GET /api/v1/jobs/{job_id} — polling endpoint for job status.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state.queue.get(job_id).map_err(|e| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    Ok(Json(JobStatusResponse::from(job)))
}

/// GET /api/v1/queue/stats — per-state job counts for monitoring.
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStatsResponse> {
    Json(QueueStatsResponse::from(state.queue.counts()))
}
