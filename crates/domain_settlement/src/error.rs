//! Settlement errors

use thiserror::Error;

use core_kernel::{CommissionRunId, LineItemId, MoneyError, PortError, TemporalError};
use domain_commission::CommissionError;
use domain_wallet::WalletError;

/// Errors that can occur while settling commissions and withdrawals
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Commission run not found: {0}")]
    RunNotFound(CommissionRunId),

    #[error("Invalid run transition for {id}: {from} -> {to}")]
    InvalidRunTransition {
        id: CommissionRunId,
        from: String,
        to: String,
    },

    #[error("Line item {0} is not posted")]
    LineItemNotPosted(LineItemId),

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Invalid settlement configuration: {0}")]
    InvalidConfig(String),

    #[error("Commission error: {0}")]
    Commission(#[from] CommissionError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Temporal error: {0}")]
    Temporal(#[from] TemporalError),

    #[error("Persistence error: {0}")]
    Port(#[from] PortError),
}

impl SettlementError {
    /// Lock contention, connection drops and timeouts
    pub fn is_transient(&self) -> bool {
        match self {
            SettlementError::Commission(e) => e.is_transient(),
            SettlementError::Wallet(e) => e.is_transient(),
            SettlementError::Port(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Cycles and missing agents in the hierarchy
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, SettlementError::Commission(e) if e.is_data_integrity())
    }

    /// Returns true for an insufficient-funds rejection
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            SettlementError::Wallet(WalletError::InsufficientFunds { .. })
        )
    }
}
