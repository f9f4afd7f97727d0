//! Commission runs
//!
//! A run is the persisted job record for one payment.
//!
//! ```text
//!            ┌──────────► Cancelled
//!            │
//! Queued ──claim──► Processing ──┬──► Posted
//!   ▲                            │
//!   └────operator retry──── Failed ◄┘ (error or expired lease)
//! ```
//!
//! A claim is a lease: a run still `processing` long after `claimed_at`
//! belongs to a worker that died, and is failed so operators can retry it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::CommissionRunId;
use domain_commission::CompletedPayment;

use crate::error::SettlementError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Processing,
    Posted,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Processing => "processing",
            RunState::Posted => "posted",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(RunState::Queued),
            "processing" => Some(RunState::Processing),
            "posted" => Some(RunState::Posted),
            "failed" => Some(RunState::Failed),
            "cancelled" => Some(RunState::Cancelled),
            _ => None,
        }
    }

    /// Valid transitions of the run state machine
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Queued, RunState::Processing)
                | (RunState::Queued, RunState::Cancelled)
                | (RunState::Processing, RunState::Posted)
                | (RunState::Processing, RunState::Failed)
                | (RunState::Failed, RunState::Queued)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job record of the commission settlement for one payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRun {
    pub id: CommissionRunId,
    pub payment: CompletedPayment,
    pub state: RunState,
    /// Attempts made across all processing rounds
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Start of the latest processing round
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommissionRun {
    pub fn queued(payment: CompletedPayment, at: DateTime<Utc>) -> Self {
        Self {
            id: CommissionRunId::new_v7(),
            payment,
            state: RunState::Queued,
            attempts: 0,
            last_error: None,
            claimed_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn transition(&mut self, next: RunState, at: DateTime<Utc>) -> Result<(), SettlementError> {
        if !self.state.can_transition_to(next) {
            return Err(SettlementError::InvalidRunTransition {
                id: self.id,
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = at;
        Ok(())
    }

    /// Whether a processing claim is older than `claimed_before`
    ///
    /// A processing run without a claim time counts from its last update.
    pub fn is_stale(&self, claimed_before: DateTime<Utc>) -> bool {
        self.state == RunState::Processing
            && self.claimed_at.unwrap_or(self.updated_at) < claimed_before
    }

    pub fn record_failure(&mut self, error: &SettlementError, at: DateTime<Utc>) {
        self.last_error = Some(error.to_string());
        self.updated_at = at;
    }
}
