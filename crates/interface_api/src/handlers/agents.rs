//! Agent, wallet and ledger handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use core_kernel::{AgentCode, WithdrawalId};
use domain_agent::Agent;

use crate::dto::agents::{AgentRequest, AgentResponse};
use crate::dto::wallet::{
    AdjustmentRequest, LineItemResponse, ReconciliationResponse, WalletSummaryResponse,
    WalletTransactionResponse, WithdrawalRequestBody, WithdrawalResponse,
};
use crate::extract::ValidatedJson;
use crate::{error::ApiError, AppState};

pub async fn get_agent(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<AgentResponse>, ApiError> {
    let agent = state.agents.get_agent(&AgentCode::new(code)).await?;
    Ok(Json(agent.into()))
}

/// Creates or replaces an agent
///
/// A referrer change is checked against the hierarchy first, so a loop can
/// never be written. An existing agent keeps its join date unless the
/// request sets one.
pub async fn upsert_agent(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ValidatedJson(request): ValidatedJson<AgentRequest>,
) -> Result<Json<AgentResponse>, ApiError> {
    let code = AgentCode::new(code);
    let existing = match state.agents.get_agent(&code).await {
        Ok(agent) => Some(agent),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    let joined_at = request
        .joined_at
        .or(existing.as_ref().map(|a| a.joined_at))
        .unwrap_or_else(|| state.clock.now());
    let mut agent = Agent::new(code.clone(), request.name, joined_at);
    if let Some(referrer) = request.referrer_code.map(AgentCode::new) {
        state.hierarchy.validate_referrer(&code, &referrer).await?;
        agent = agent.with_referrer(referrer);
    }
    if let Some(status) = request.status.or(existing.map(|a| a.status)) {
        agent = agent.with_status(status);
    }

    state.agents.save_agent(&agent).await?;
    info!(agent = %agent.code, referrer = ?agent.referrer, "Agent saved");
    Ok(Json(agent.into()))
}

/// Direct recruits of an agent
pub async fn get_downline(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<AgentResponse>>, ApiError> {
    let agents = state.hierarchy.downline(&AgentCode::new(code)).await?;
    Ok(Json(agents.into_iter().map(Into::into).collect()))
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<WalletSummaryResponse>, ApiError> {
    let summary = state.queries.wallet_summary(&AgentCode::new(code)).await?;
    Ok(Json(summary.into()))
}

/// Commission line items earned by an agent, newest first
pub async fn get_commissions(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<LineItemResponse>>, ApiError> {
    let items = state.queries.commission_history(&AgentCode::new(code)).await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ValidatedJson(request): ValidatedJson<WithdrawalRequestBody>,
) -> Result<(StatusCode, Json<WithdrawalResponse>), ApiError> {
    let id = request
        .withdrawal_id
        .map(WithdrawalId::from_uuid)
        .unwrap_or_else(WithdrawalId::new_v7);
    let withdrawal = state
        .service
        .orchestrator()
        .request_withdrawal(id, &AgentCode::new(code), request.amount_minor)
        .await?;
    Ok((StatusCode::CREATED, Json(withdrawal.into())))
}

pub async fn adjust_wallet(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ValidatedJson(request): ValidatedJson<AdjustmentRequest>,
) -> Result<(StatusCode, Json<WalletTransactionResponse>), ApiError> {
    let entry = state
        .service
        .orchestrator()
        .adjust_wallet(
            &AgentCode::new(code),
            request.amount_minor,
            &request.actor,
            &request.reason,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}

/// Compares the cached balance with the ledger sum
pub async fn reconcile_wallet(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ReconciliationResponse>, ApiError> {
    let report = state
        .service
        .orchestrator()
        .reconcile_wallet(&AgentCode::new(code))
        .await?;
    Ok(Json(report.into()))
}
