//! Commission line items
//!
//! One line item is produced per earning upline level of a payment. It starts
//! `Pending`, becomes `Posted` once its wallet credit is committed and can be
//! `Reversed` by an offsetting adjustment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    AgentCode, CommissionRuleId, LineItemId, Money, PaymentId, WalletTransactionId,
};

use crate::error::CommissionError;

/// Line item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemStatus {
    Pending,
    Posted,
    Reversed,
}

impl LineItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineItemStatus::Pending => "pending",
            LineItemStatus::Posted => "posted",
            LineItemStatus::Reversed => "reversed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LineItemStatus::Pending),
            "posted" => Some(LineItemStatus::Posted),
            "reversed" => Some(LineItemStatus::Reversed),
            _ => None,
        }
    }
}

/// A computed commission for one agent at one tier of one payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionLineItem {
    pub id: LineItemId,
    pub payment_id: PaymentId,
    /// The upline agent who earns this commission
    pub agent_code: AgentCode,
    pub level: u8,
    pub basis: Money,
    pub amount: Money,
    pub rule_id: CommissionRuleId,
    pub status: LineItemStatus,
    /// Credit entry this item was posted as
    pub wallet_transaction_id: Option<WalletTransactionId>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
}

impl CommissionLineItem {
    pub fn pending(
        payment_id: PaymentId,
        agent_code: AgentCode,
        level: u8,
        basis: Money,
        amount: Money,
        rule_id: CommissionRuleId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LineItemId::new_v7(),
            payment_id,
            agent_code,
            level,
            basis,
            amount,
            rule_id,
            status: LineItemStatus::Pending,
            wallet_transaction_id: None,
            created_at,
            posted_at: None,
            reversed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == LineItemStatus::Pending
    }

    /// Records the wallet credit this item was posted as
    pub fn mark_posted(
        &mut self,
        transaction_id: WalletTransactionId,
        at: DateTime<Utc>,
    ) -> Result<(), CommissionError> {
        self.transition(LineItemStatus::Pending, LineItemStatus::Posted)?;
        self.wallet_transaction_id = Some(transaction_id);
        self.posted_at = Some(at);
        Ok(())
    }

    pub fn mark_reversed(&mut self, at: DateTime<Utc>) -> Result<(), CommissionError> {
        self.transition(LineItemStatus::Posted, LineItemStatus::Reversed)?;
        self.reversed_at = Some(at);
        Ok(())
    }

    fn transition(
        &mut self,
        expected: LineItemStatus,
        next: LineItemStatus,
    ) -> Result<(), CommissionError> {
        if self.status != expected {
            return Err(CommissionError::InvalidStateTransition {
                id: self.id,
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    fn item() -> CommissionLineItem {
        CommissionLineItem::pending(
            PaymentId::new(),
            AgentCode::new("B"),
            1,
            Money::from_minor(10000, Currency::MYR),
            Money::from_minor(1000, Currency::MYR),
            CommissionRuleId::new(),
            Utc::now(),
        )
    }

    #[test]
    fn test_post_then_reverse() {
        let mut li = item();
        let tx = WalletTransactionId::new();

        li.mark_posted(tx, Utc::now()).unwrap();
        assert_eq!(li.status, LineItemStatus::Posted);
        assert_eq!(li.wallet_transaction_id, Some(tx));

        li.mark_reversed(Utc::now()).unwrap();
        assert_eq!(li.status, LineItemStatus::Reversed);
    }

    #[test]
    fn test_cannot_post_twice() {
        let mut li = item();
        li.mark_posted(WalletTransactionId::new(), Utc::now()).unwrap();

        let err = li.mark_posted(WalletTransactionId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, CommissionError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_cannot_reverse_pending() {
        let mut li = item();
        assert!(li.mark_reversed(Utc::now()).is_err());
    }
}
