//! Wallet domain errors

use thiserror::Error;

use core_kernel::{AgentCode, Money, MoneyError, PortError, WithdrawalId};

/// Errors that can occur in the wallet domain
#[derive(Debug, Error)]
pub enum WalletError {
    /// A debit or withdrawal approval exceeds what the wallet can cover
    #[error("Insufficient funds for {agent}: requested {requested}, available {available}")]
    InsufficientFunds {
        agent: AgentCode,
        requested: Money,
        available: Money,
    },

    /// An adjustment would take the balance below zero
    #[error("Adjustment of {adjustment} would leave {agent} with negative balance {resulting}")]
    NegativeBalance {
        agent: AgentCode,
        adjustment: Money,
        resulting: Money,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Withdrawal of {requested} is below the minimum {minimum}")]
    BelowMinimum {
        requested: Money,
        minimum: Money,
    },

    #[error("Withdrawal request not found: {0}")]
    WithdrawalNotFound(WithdrawalId),

    #[error("Invalid withdrawal transition for {id}: {from} -> {to}")]
    InvalidStateTransition {
        id: WithdrawalId,
        from: String,
        to: String,
    },

    #[error("Adjustments require an actor and a reason")]
    MissingAuditInfo,

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Persistence error: {0}")]
    Port(#[from] PortError),
}

impl WalletError {
    /// Returns true if retrying the operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, WalletError::Port(e) if e.is_transient())
    }

    /// Returns true for business rejections that are reported to the caller
    /// rather than retried
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            WalletError::InsufficientFunds { .. }
                | WalletError::NegativeBalance { .. }
                | WalletError::BelowMinimum { .. }
                | WalletError::InvalidAmount(_)
        )
    }
}
