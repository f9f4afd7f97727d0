//! Commission run and batch handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use core_kernel::CommissionRunId;
use domain_settlement::BatchReport;

use crate::dto::runs::{MonthlyBatchRequest, RunResponse};
use crate::extract::ValidatedJson;
use crate::{error::ApiError, AppState};

/// Runs awaiting operator review, oldest first
pub async fn failed_runs(State(state): State<AppState>) -> Result<Json<Vec<RunResponse>>, ApiError> {
    let runs = state.service.failed_runs().await?;
    Ok(Json(runs.into_iter().map(Into::into).collect()))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunResponse>, ApiError> {
    let run = state
        .service
        .orchestrator()
        .get_run(CommissionRunId::from_uuid(id))
        .await?;
    Ok(Json(run.into()))
}

/// Moves a failed run back to queued and enqueues it
pub async fn retry_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunResponse>, ApiError> {
    let run = state.service.retry_run(CommissionRunId::from_uuid(id)).await?;
    Ok(Json(run.into()))
}

/// Cancels a run that has not started
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunResponse>, ApiError> {
    let run = state.service.cancel_run(CommissionRunId::from_uuid(id)).await?;
    Ok(Json(run.into()))
}

/// Re-scans a calendar month and enqueues every unposted payment
pub async fn monthly_batch(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<MonthlyBatchRequest>,
) -> Result<Json<BatchReport>, ApiError> {
    let report = state
        .service
        .run_monthly_batch(request.year, request.month)
        .await?;
    Ok(Json(report))
}
