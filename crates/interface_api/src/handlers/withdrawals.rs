//! Operator actions on withdrawals and line items

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use core_kernel::{LineItemId, WithdrawalId};

use crate::dto::wallet::{
    RejectWithdrawalRequest, ReversalRequest, WalletTransactionResponse, WithdrawalResponse,
};
use crate::extract::ValidatedJson;
use crate::{error::ApiError, AppState};

pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<RejectWithdrawalRequest>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    let withdrawal = state
        .service
        .orchestrator()
        .reject_withdrawal(WithdrawalId::from_uuid(id), &request.reason)
        .await?;
    Ok(Json(withdrawal.into()))
}

/// Offsets a posted commission with a negative adjustment
pub async fn reverse_line_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<ReversalRequest>,
) -> Result<Json<WalletTransactionResponse>, ApiError> {
    let entry = state
        .service
        .orchestrator()
        .reverse_line_item(LineItemId::from_uuid(id), &request.actor, &request.reason)
        .await?;
    Ok(Json(entry.into()))
}
