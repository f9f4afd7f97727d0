//! Inbound events from the payment subsystem

use axum::{extract::State, http::StatusCode, Json};
use tracing::instrument;

use crate::dto::events::{PaymentCompletedRequest, WithdrawalApprovedRequest, WithdrawalSettledResponse};
use crate::dto::runs::RunResponse;
use crate::extract::ValidatedJson;
use crate::{error::ApiError, AppState};

/// Admits a completed payment
///
/// Answers 202 with the commission run; the commission itself is calculated
/// by the worker pool. A replayed event returns the run recorded the first
/// time.
#[instrument(skip(state, request), fields(payment_id = %request.payment_id))]
pub async fn payment_completed(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<PaymentCompletedRequest>,
) -> Result<(StatusCode, Json<RunResponse>), ApiError> {
    let run = state.service.submit_payment(request.into()).await?;
    Ok((StatusCode::ACCEPTED, Json(run.into())))
}

/// Settles an approved withdrawal and waits for the debit
///
/// An insufficient balance answers 422 and leaves the request rejected.
#[instrument(skip(state, request), fields(request_id = %request.request_id))]
pub async fn withdrawal_approved(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<WithdrawalApprovedRequest>,
) -> Result<Json<WithdrawalSettledResponse>, ApiError> {
    let outcome = state.service.submit_withdrawal(request.into()).await?;
    Ok(Json(outcome.into()))
}
