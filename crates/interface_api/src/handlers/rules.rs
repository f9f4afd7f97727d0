//! Commission rule table handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::{CommissionRuleId, PlanId};

use crate::dto::rules::{RuleRequest, RuleResponse, SupersedeResponse};
use crate::extract::ValidatedJson;
use crate::{error::ApiError, AppState};

/// Adds a rule; an overlapping active rule answers 409
pub async fn create_rule(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RuleRequest>,
) -> Result<(StatusCode, Json<RuleResponse>), ApiError> {
    let rule = request.into_rule(state.clock.now())?;
    let rule = state.rules().insert(rule).await?;
    Ok((StatusCode::CREATED, Json(rule.into())))
}

/// Installs an effective-dated override, closing the rules it overlaps
pub async fn supersede_rule(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RuleRequest>,
) -> Result<(StatusCode, Json<SupersedeResponse>), ApiError> {
    let rule = request.into_rule(state.clock.now())?;
    let superseded = state.rules().supersede(rule.clone()).await?;
    Ok((
        StatusCode::CREATED,
        Json(SupersedeResponse {
            rule: rule.into(),
            superseded: superseded.iter().map(|id| *id.as_uuid()).collect(),
        }),
    ))
}

pub async fn activate_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RuleResponse>, ApiError> {
    let rule = state.rules().activate(CommissionRuleId::from_uuid(id)).await?;
    Ok(Json(rule.into()))
}

pub async fn deactivate_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RuleResponse>, ApiError> {
    let rule = state.rules().deactivate(CommissionRuleId::from_uuid(id)).await?;
    Ok(Json(rule.into()))
}

pub async fn plan_rules(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<Vec<RuleResponse>>, ApiError> {
    let rules = state.rules().rules_for_plan(&PlanId::new(plan_id)).await?;
    Ok(Json(rules.into_iter().map(Into::into).collect()))
}
