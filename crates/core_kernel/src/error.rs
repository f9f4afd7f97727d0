//! Kernel-level errors

use thiserror::Error;

use crate::money::MoneyError;
use crate::temporal::TemporalError;

/// Failures raised by the shared value types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Temporal(#[from] TemporalError),

    /// An agent code or plan id that cannot be normalized
    #[error("invalid {kind}: {reason}")]
    InvalidCode { kind: &'static str, reason: String },
}

impl CoreError {
    pub fn invalid_code(kind: &'static str, reason: impl Into<String>) -> Self {
        CoreError::InvalidCode {
            kind,
            reason: reason.into(),
        }
    }
}
