//! Commission domain errors

use thiserror::Error;

use core_kernel::{CommissionRuleId, LineItemId, MoneyError, PortError, TemporalError};
use domain_agent::AgentError;

/// Errors that can occur in the commission domain
#[derive(Debug, Error)]
pub enum CommissionError {
    #[error("Invalid payment: {0}")]
    InvalidPayment(String),

    #[error("Invalid commission rule: {0}")]
    InvalidRule(String),

    /// Two active rules for the same (plan, tier, frequency) would overlap
    #[error("Rule {candidate} overlaps active rule {existing}")]
    RuleConflict {
        existing: CommissionRuleId,
        candidate: CommissionRuleId,
    },

    #[error("Commission rule not found: {0}")]
    RuleNotFound(CommissionRuleId),

    #[error("Commission line item not found: {0}")]
    LineItemNotFound(LineItemId),

    #[error("Invalid line item transition for {id}: {from} -> {to}")]
    InvalidStateTransition {
        id: LineItemId,
        from: String,
        to: String,
    },

    #[error("Hierarchy error: {0}")]
    Agent(#[from] AgentError),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Temporal error: {0}")]
    Temporal(#[from] TemporalError),

    #[error("Persistence error: {0}")]
    Port(#[from] PortError),
}

impl CommissionError {
    /// Returns true if retrying the calculation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            CommissionError::Agent(e) => e.is_transient(),
            CommissionError::Port(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns true for broken hierarchy data that must not be retried
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, CommissionError::Agent(e) if e.is_data_integrity())
    }
}
