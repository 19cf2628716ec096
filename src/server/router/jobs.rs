use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use skuflow_core_types::JobId;
use skuflow_scheduler::{ExecutionRequest, JobService, JobStatusView, SubmitResponse};
use tracing::instrument;

use crate::errors::ApiError;
use crate::server::{AppState, Caller};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/scrape", post(submit_handler))
        .route("/job-result/:job_id", get(job_status_handler))
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/:job_id", get(job_detail_handler))
}

#[instrument(skip_all, fields(tenant = %caller.0.tenant))]
async fn submit_handler(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(request) = payload.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let job_id = state.jobs.submit(caller.0, request).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

#[instrument(skip(state))]
async fn job_status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    let view = state.jobs.status(&JobId(job_id)).await?;
    Ok(Json(view))
}

#[instrument(skip(state))]
async fn job_detail_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job = state.jobs.job(&JobId(job_id)).await?;
    Ok(Json(json!({ "data": job })))
}

#[instrument(skip_all)]
async fn list_jobs_handler(State(state): State<AppState>) -> Json<Value> {
    let jobs = state.jobs.list().await;
    Json(json!({ "data": jobs }))
}
