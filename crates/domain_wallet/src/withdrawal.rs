//! Withdrawal requests
//!
//! ```text
//! Pending ──approve──► Approved ──mark_paid──► Paid
//!    │
//!    └──reject──► Rejected
//! ```
//!
//! Only `mark_paid` moves money; it is recorded together with the debit entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{AgentCode, Money, WalletTransactionId, WithdrawalId};

use crate::error::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Paid => "paid",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "approved" => Some(WithdrawalStatus::Approved),
            "paid" => Some(WithdrawalStatus::Paid),
            "rejected" => Some(WithdrawalStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Paid | WithdrawalStatus::Rejected)
    }
}

/// An agent's request to withdraw from their wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: WithdrawalId,
    pub agent_code: AgentCode,
    pub amount: Money,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    /// Debit entry that settled the request
    pub transaction_id: Option<WalletTransactionId>,
}

impl WithdrawalRequest {
    pub fn new(id: WithdrawalId, agent_code: AgentCode, amount: Money, at: DateTime<Utc>) -> Self {
        Self {
            id,
            agent_code,
            amount,
            status: WithdrawalStatus::Pending,
            requested_at: at,
            decided_at: None,
            paid_at: None,
            rejection_reason: None,
            transaction_id: None,
        }
    }

    pub fn approve(&mut self, at: DateTime<Utc>) -> Result<(), WalletError> {
        self.transition(WithdrawalStatus::Pending, WithdrawalStatus::Approved)?;
        self.decided_at = Some(at);
        Ok(())
    }

    pub fn reject(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> Result<(), WalletError> {
        self.transition(WithdrawalStatus::Pending, WithdrawalStatus::Rejected)?;
        self.decided_at = Some(at);
        self.rejection_reason = Some(reason.into());
        Ok(())
    }

    pub fn mark_paid(
        &mut self,
        transaction_id: WalletTransactionId,
        at: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        self.transition(WithdrawalStatus::Approved, WithdrawalStatus::Paid)?;
        self.paid_at = Some(at);
        self.transaction_id = Some(transaction_id);
        Ok(())
    }

    fn transition(
        &mut self,
        expected: WithdrawalStatus,
        next: WithdrawalStatus,
    ) -> Result<(), WalletError> {
        if self.status != expected {
            return Err(WalletError::InvalidStateTransition {
                id: self.id,
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}
