//! Inbound events from the payment subsystem

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{AgentCode, Currency, Money, PaymentId, PlanId, PolicyId, WithdrawalId};
use domain_commission::{CompletedPayment, PaymentFrequency};

use crate::error::SettlementError;

/// A premium payment completed upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    pub payment_id: PaymentId,
    pub policy_id: PolicyId,
    pub agent_code: AgentCode,
    pub plan_id: PlanId,
    pub basis_amount_minor: i64,
    pub currency: Currency,
    pub frequency: PaymentFrequency,
    pub completed_at: DateTime<Utc>,
}

impl PaymentCompleted {
    /// Converts the event into the engine's payment snapshot
    pub fn into_payment(self) -> Result<CompletedPayment, SettlementError> {
        if self.basis_amount_minor <= 0 {
            return Err(SettlementError::InvalidEvent(format!(
                "payment {} has non-positive basis amount {}",
                self.payment_id, self.basis_amount_minor
            )));
        }
        Ok(CompletedPayment {
            payment_id: self.payment_id,
            policy_id: self.policy_id,
            agent_code: self.agent_code,
            plan_id: self.plan_id,
            frequency: self.frequency,
            basis: Money::from_minor(self.basis_amount_minor, self.currency),
            completed_at: self.completed_at,
        })
    }
}

/// An admin approved an agent's withdrawal request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalApproved {
    pub request_id: WithdrawalId,
    pub agent_code: AgentCode,
    pub amount_minor: i64,
}

impl WithdrawalApproved {
    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.amount_minor <= 0 {
            return Err(SettlementError::InvalidEvent(format!(
                "withdrawal {} has non-positive amount {}",
                self.request_id, self.amount_minor
            )));
        }
        Ok(())
    }
}
