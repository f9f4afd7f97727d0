//! Wallet, ledger and withdrawal DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_commission::CommissionLineItem;
use domain_wallet::{Reconciliation, SourceRef, WalletSummary, WalletTransaction, WithdrawalRequest};

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletSummaryResponse {
    pub agent_code: String,
    pub currency: String,
    pub balance_minor: i64,
    /// Balance minus approved, unpaid withdrawals
    pub available_minor: i64,
    pub total_earned_minor: i64,
    pub total_withdrawn_minor: i64,
    /// Calculated but not yet posted
    pub pending_commission_minor: i64,
}

impl From<WalletSummary> for WalletSummaryResponse {
    fn from(summary: WalletSummary) -> Self {
        Self {
            agent_code: summary.agent_code.to_string(),
            currency: summary.balance.currency().code().to_string(),
            balance_minor: summary.balance.minor_units(),
            available_minor: summary.available.minor_units(),
            total_earned_minor: summary.total_earned.minor_units(),
            total_withdrawn_minor: summary.total_withdrawn.minor_units(),
            pending_commission_minor: summary.pending_commission.minor_units(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LineItemResponse {
    pub line_item_id: Uuid,
    pub payment_id: Uuid,
    pub agent_code: String,
    pub level: u8,
    pub basis_minor: i64,
    pub amount_minor: i64,
    pub currency: String,
    pub rule_id: Uuid,
    pub status: String,
    pub wallet_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
}

impl From<CommissionLineItem> for LineItemResponse {
    fn from(item: CommissionLineItem) -> Self {
        Self {
            line_item_id: *item.id.as_uuid(),
            payment_id: *item.payment_id.as_uuid(),
            agent_code: item.agent_code.to_string(),
            level: item.level,
            basis_minor: item.basis.minor_units(),
            amount_minor: item.amount.minor_units(),
            currency: item.amount.currency().code().to_string(),
            rule_id: *item.rule_id.as_uuid(),
            status: item.status.as_str().to_string(),
            wallet_transaction_id: item.wallet_transaction_id.map(|id| *id.as_uuid()),
            created_at: item.created_at,
            posted_at: item.posted_at,
            reversed_at: item.reversed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WalletTransactionResponse {
    pub transaction_id: Uuid,
    pub agent_code: String,
    pub kind: String,
    pub amount_minor: i64,
    pub balance_after_minor: i64,
    pub currency: String,
    pub source: SourceRef,
    pub created_at: DateTime<Utc>,
}

impl From<WalletTransaction> for WalletTransactionResponse {
    fn from(entry: WalletTransaction) -> Self {
        Self {
            transaction_id: *entry.id.as_uuid(),
            agent_code: entry.agent_code.to_string(),
            kind: entry.kind.as_str().to_string(),
            amount_minor: entry.amount.minor_units(),
            balance_after_minor: entry.balance_after.minor_units(),
            currency: entry.amount.currency().code().to_string(),
            source: entry.source,
            created_at: entry.created_at,
        }
    }
}

/// An agent asks to withdraw; the id is generated when absent
#[derive(Debug, Deserialize, Validate)]
pub struct WithdrawalRequestBody {
    pub withdrawal_id: Option<Uuid>,
    #[validate(range(min = 1, message = "must be positive"))]
    pub amount_minor: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectWithdrawalRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub withdrawal_id: Uuid,
    pub agent_code: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl From<WithdrawalRequest> for WithdrawalResponse {
    fn from(request: WithdrawalRequest) -> Self {
        Self {
            withdrawal_id: *request.id.as_uuid(),
            agent_code: request.agent_code.to_string(),
            amount_minor: request.amount.minor_units(),
            currency: request.amount.currency().code().to_string(),
            status: request.status.as_str().to_string(),
            requested_at: request.requested_at,
            decided_at: request.decided_at,
            paid_at: request.paid_at,
            rejection_reason: request.rejection_reason,
        }
    }
}

/// Manual signed correction; the ledger rejects a zero amount
#[derive(Debug, Deserialize, Validate)]
pub struct AdjustmentRequest {
    pub amount_minor: i64,
    #[validate(length(min = 1, max = 100))]
    pub actor: String,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

/// Operator reversal of a posted line item
#[derive(Debug, Deserialize, Validate)]
pub struct ReversalRequest {
    #[validate(length(min = 1, max = 100))]
    pub actor: String,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ReconciliationResponse {
    pub agent_code: String,
    pub cached_balance_minor: i64,
    pub ledger_sum_minor: i64,
    pub last_balance_after_minor: Option<i64>,
    pub entry_count: usize,
    pub consistent: bool,
}

impl From<Reconciliation> for ReconciliationResponse {
    fn from(report: Reconciliation) -> Self {
        Self {
            consistent: report.is_consistent(),
            agent_code: report.agent_code.to_string(),
            cached_balance_minor: report.cached_balance.minor_units(),
            ledger_sum_minor: report.ledger_sum.minor_units(),
            last_balance_after_minor: report.last_balance_after.map(|m| m.minor_units()),
            entry_count: report.entry_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_audit_fields_are_invalid() {
        let request = AdjustmentRequest {
            amount_minor: -500,
            actor: String::new(),
            reason: "clawback".to_string(),
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("actor"));
    }

    #[test]
    fn test_withdrawal_amount_must_be_positive() {
        let request = WithdrawalRequestBody {
            withdrawal_id: None,
            amount_minor: 0,
        };
        assert!(request.validate().is_err());
    }
}
