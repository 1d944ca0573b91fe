// crates/server/src/routes/jobs.rs
//! Batch import as a background job.
//!
//! - POST /batch: start a run, returns `{ "job_id" }`
//! - GET /jobs: active jobs
//! - GET /jobs/{id}: progress snapshot
//! - POST /jobs/{id}/cancel

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use handoff_pipeline::{BatchParams, ProgressFn};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::jobs::{JobId, JobProgress, JobState};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BatchStarted {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    /// False when the job had already finished.
    pub cancelled: bool,
}

/// POST /api/batch
async fn start_batch(
    State(state): State<Arc<AppState>>,
    Json(params): Json<BatchParams>,
) -> ApiResult<(StatusCode, Json<BatchStarted>)> {
    params.validate()?;
    let coordinator = state.batch_coordinator(params.dry_run).ok_or_else(|| {
        ApiError::Unavailable("bulk extraction requires OPENROUTER_API_KEY".into())
    })?;

    let job_id = state
        .jobs
        .start_job("batch", move |job: Arc<JobState>, cancel| async move {
            let on_progress: ProgressFn = Arc::new(move |done: usize, total: usize| {
                job.set_progress(done as u64, total as u64);
            });
            coordinator
                .run_with_progress(&params, cancel, on_progress)
                .await
                .map_err(|e| e.to_string())
        });
    tracing::info!(job_id, "batch job started");

    Ok((StatusCode::ACCEPTED, Json(BatchStarted { job_id })))
}

/// GET /api/jobs
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobProgress>> {
    Json(state.jobs.active_jobs())
}

/// GET /api/jobs/{id}
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobProgress>> {
    state
        .jobs
        .get_job(id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(id))
}

/// POST /api/jobs/{id}/cancel
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<CancelResponse>> {
    let cancelled = state.jobs.cancel(id).ok_or(ApiError::JobNotFound(id))?;
    Ok(Json(CancelResponse {
        job_id: id,
        cancelled,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/batch", post(start_batch))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
}
