//! Completed premium payments as seen by the commission engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{AgentCode, Money, PaymentId, PlanId, PolicyId};

use crate::error::CommissionError;
use crate::rule::PaymentFrequency;

/// A premium payment that has completed upstream
///
/// Immutable once received; the engine only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPayment {
    pub payment_id: PaymentId,
    pub policy_id: PolicyId,
    /// The agent who enrolled the member
    pub agent_code: AgentCode,
    pub plan_id: PlanId,
    pub frequency: PaymentFrequency,
    /// Commissionable amount
    pub basis: Money,
    pub completed_at: DateTime<Utc>,
}

impl CompletedPayment {
    /// Rejects payments the engine cannot compute on
    pub fn validate(&self) -> Result<(), CommissionError> {
        if !self.basis.is_positive() {
            return Err(CommissionError::InvalidPayment(format!(
                "payment {} has non-positive basis amount {}",
                self.payment_id, self.basis
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    #[test]
    fn test_zero_basis_rejected() {
        let payment = CompletedPayment {
            payment_id: PaymentId::new(),
            policy_id: PolicyId::new(),
            agent_code: AgentCode::new("A"),
            plan_id: PlanId::new("LIFE01"),
            frequency: PaymentFrequency::Monthly,
            basis: Money::zero(Currency::MYR),
            completed_at: Utc::now(),
        };
        assert!(matches!(payment.validate(), Err(CommissionError::InvalidPayment(_))));
    }
}
