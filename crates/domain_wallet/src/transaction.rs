//! Wallet ledger entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{AgentCode, LineItemId, Money, WalletTransactionId, WithdrawalId};

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Commission posting, always positive
    Credit,
    /// Withdrawal settlement, always negative
    Debit,
    /// Manual correction or reversal, either sign
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
            TransactionKind::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(TransactionKind::Credit),
            "debit" => Some(TransactionKind::Debit),
            "adjustment" => Some(TransactionKind::Adjustment),
            _ => None,
        }
    }
}

/// What caused a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceRef {
    /// Posting of a commission line item
    LineItem { line_item_id: LineItemId },
    /// Offsetting entry for a previously posted line item
    Reversal { line_item_id: LineItemId, actor: String, reason: String },
    /// Settlement of a withdrawal request
    Withdrawal { withdrawal_id: WithdrawalId },
    /// Manual admin entry
    Manual { actor: String, reason: String },
}

impl SourceRef {
    pub fn line_item(id: LineItemId) -> Self {
        SourceRef::LineItem { line_item_id: id }
    }

    pub fn withdrawal(id: WithdrawalId) -> Self {
        SourceRef::Withdrawal { withdrawal_id: id }
    }

    pub fn manual(actor: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceRef::Manual {
            actor: actor.into(),
            reason: reason.into(),
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            SourceRef::LineItem { .. } => "line_item",
            SourceRef::Reversal { .. } => "reversal",
            SourceRef::Withdrawal { .. } => "withdrawal",
            SourceRef::Manual { .. } => "manual",
        }
    }
}

/// An append-only ledger entry
///
/// `balance_after` always equals the previous entry's `balance_after` plus
/// `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: WalletTransactionId,
    pub agent_code: AgentCode,
    pub kind: TransactionKind,
    /// Signed amount; debits are negative
    pub amount: Money,
    pub balance_after: Money,
    pub source: SourceRef,
    pub created_at: DateTime<Utc>,
}
