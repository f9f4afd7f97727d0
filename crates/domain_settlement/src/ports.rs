//! Settlement Ports
//!
//! A unit of work spans both the commission and the wallet tables, so the
//! transaction handle is a single object implementing both domain
//! transaction traits.
//!
//! - [`SettlementStore::begin`] opens a [`SettlementTx`]
//! - [`SettlementTx::commit`] makes every write visible; dropping the handle
//!   without committing rolls back
//! - [`RunStore`] persists run records outside of settlement transactions

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{CommissionRunId, DomainPort, HealthCheckable, PaymentId, PortError};
use domain_commission::CommissionTx;
use domain_wallet::LedgerTx;

use crate::run::{CommissionRun, RunState};

/// Transaction handle over commission and wallet state
#[async_trait]
pub trait SettlementTx: CommissionTx + LedgerTx {
    async fn commit(self: Box<Self>) -> Result<(), PortError>;
}

/// Opens settlement transactions
#[async_trait]
pub trait SettlementStore: DomainPort + HealthCheckable {
    async fn begin(&self) -> Result<Box<dyn SettlementTx>, PortError>;
}

/// Persistence of commission runs
#[async_trait]
pub trait RunStore: DomainPort {
    /// Stores a new run unless one exists for the same payment
    ///
    /// # Returns
    ///
    /// The stored run and whether it was newly created
    async fn insert_run(&self, run: &CommissionRun) -> Result<(CommissionRun, bool), PortError>;

    async fn get_run(&self, id: CommissionRunId) -> Result<CommissionRun, PortError>;

    async fn run_for_payment(&self, payment_id: PaymentId) -> Result<Option<CommissionRun>, PortError>;

    /// Atomically moves a run from `from` to `to`
    ///
    /// Returns `None` if the run is not in `from`, e.g. another worker
    /// claimed it first or it was cancelled. `Queued -> Processing` through
    /// this call is the only way a run is admitted for processing, and it
    /// stamps `claimed_at` with `at`.
    async fn transition_run(
        &self,
        id: CommissionRunId,
        from: RunState,
        to: RunState,
        at: DateTime<Utc>,
    ) -> Result<Option<CommissionRun>, PortError>;

    /// Writes state, attempts and last error of a run
    async fn update_run(&self, run: &CommissionRun) -> Result<(), PortError>;

    /// Runs in a state, oldest first
    async fn runs_in_state(&self, state: RunState) -> Result<Vec<CommissionRun>, PortError>;

    /// Moves every `processing` run claimed before `claimed_before` to
    /// `failed` with `reason` as its last error
    ///
    /// Each run moves at most once even with concurrent callers.
    ///
    /// # Returns
    ///
    /// The runs that were failed by this call
    async fn fail_stale_runs(
        &self,
        claimed_before: DateTime<Utc>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<CommissionRun>, PortError>;
}
