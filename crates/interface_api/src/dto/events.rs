//! Inbound event DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{AgentCode, Currency, PaymentId, PlanId, PolicyId, WithdrawalId};
use domain_commission::PaymentFrequency;
use domain_settlement::{PaymentCompleted, WithdrawalApproved, WithdrawalOutcome};

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentCompletedRequest {
    pub payment_id: Uuid,
    pub policy_id: Uuid,
    #[validate(length(min = 1, max = 32))]
    pub agent_code: String,
    #[validate(length(min = 1, max = 32))]
    pub plan_id: String,
    #[validate(range(min = 1, message = "must be positive"))]
    pub basis_amount_minor: i64,
    pub currency: Currency,
    pub frequency: PaymentFrequency,
    pub completed_at: DateTime<Utc>,
}

impl From<PaymentCompletedRequest> for PaymentCompleted {
    fn from(request: PaymentCompletedRequest) -> Self {
        PaymentCompleted {
            payment_id: PaymentId::from_uuid(request.payment_id),
            policy_id: PolicyId::from_uuid(request.policy_id),
            agent_code: AgentCode::new(request.agent_code),
            plan_id: PlanId::new(request.plan_id),
            basis_amount_minor: request.basis_amount_minor,
            currency: request.currency,
            frequency: request.frequency,
            completed_at: request.completed_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct WithdrawalApprovedRequest {
    pub request_id: Uuid,
    #[validate(length(min = 1, max = 32))]
    pub agent_code: String,
    #[validate(range(min = 1, message = "must be positive"))]
    pub amount_minor: i64,
}

impl From<WithdrawalApprovedRequest> for WithdrawalApproved {
    fn from(request: WithdrawalApprovedRequest) -> Self {
        WithdrawalApproved {
            request_id: WithdrawalId::from_uuid(request.request_id),
            agent_code: AgentCode::new(request.agent_code),
            amount_minor: request.amount_minor,
        }
    }
}

/// Result of settling an approved withdrawal
#[derive(Debug, Serialize)]
pub struct WithdrawalSettledResponse {
    pub withdrawal_id: Uuid,
    pub agent_code: String,
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
    /// Debit entry created by this call
    pub transaction_id: Option<Uuid>,
    pub balance_after_minor: Option<i64>,
    pub already_settled: bool,
}

impl From<WithdrawalOutcome> for WithdrawalSettledResponse {
    fn from(outcome: WithdrawalOutcome) -> Self {
        let request = outcome.request;
        Self {
            withdrawal_id: *request.id.as_uuid(),
            agent_code: request.agent_code.to_string(),
            status: request.status.as_str().to_string(),
            amount_minor: request.amount.minor_units(),
            currency: request.amount.currency().code().to_string(),
            transaction_id: outcome.transaction.as_ref().map(|t| *t.id.as_uuid()),
            balance_after_minor: outcome.transaction.map(|t| t.balance_after.minor_units()),
            already_settled: outcome.already_settled,
        }
    }
}
