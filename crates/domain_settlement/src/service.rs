//! Settlement service
//!
//! Entry point for inbound events and operator actions. Admission happens
//! synchronously; commission math always runs on the worker pool.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{info, instrument};

use core_kernel::CommissionRunId;

use crate::error::SettlementError;
use crate::events::{PaymentCompleted, WithdrawalApproved};
use crate::orchestrator::{BatchReport, Orchestrator, WithdrawalOutcome};
use crate::queue::{Job, JobQueue};
use crate::run::{CommissionRun, RunState};

#[derive(Clone)]
pub struct SettlementService {
    orchestrator: Arc<Orchestrator>,
    queue: JobQueue,
}

impl SettlementService {
    pub fn new(orchestrator: Arc<Orchestrator>, queue: JobQueue) -> Self {
        Self {
            orchestrator,
            queue,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Admits a completed payment and enqueues its run
    ///
    /// Duplicate events return the existing run; it is enqueued again only
    /// while still queued, which the run claim makes harmless.
    #[instrument(skip(self, event), fields(payment_id = %event.payment_id))]
    pub async fn submit_payment(&self, event: PaymentCompleted) -> Result<CommissionRun, SettlementError> {
        let (run, _) = self.orchestrator.admit_payment(event).await?;
        if run.state == RunState::Queued {
            self.queue.enqueue(Job::ProcessCommission(run.id)).await?;
        }
        Ok(run)
    }

    /// Settles an approved withdrawal on the pool and waits for the outcome
    #[instrument(skip(self, event), fields(withdrawal_id = %event.request_id))]
    pub async fn submit_withdrawal(
        &self,
        event: WithdrawalApproved,
    ) -> Result<WithdrawalOutcome, SettlementError> {
        event.validate()?;
        let (reply, outcome) = oneshot::channel();
        self.queue
            .enqueue(Job::SettleWithdrawal {
                event,
                reply: Some(reply),
            })
            .await?;
        outcome.await.map_err(|_| SettlementError::QueueClosed)?
    }

    pub async fn retry_run(&self, id: CommissionRunId) -> Result<CommissionRun, SettlementError> {
        let run = self.orchestrator.retry_run(id).await?;
        self.queue.enqueue(Job::ProcessCommission(run.id)).await?;
        Ok(run)
    }

    pub async fn cancel_run(&self, id: CommissionRunId) -> Result<CommissionRun, SettlementError> {
        self.orchestrator.cancel_run(id).await
    }

    /// Runs the monthly re-scan and enqueues every run it reports
    pub async fn run_monthly_batch(&self, year: i32, month: u32) -> Result<BatchReport, SettlementError> {
        let report = self.orchestrator.monthly_batch(year, month).await?;
        for run_id in &report.enqueued {
            self.queue.enqueue(Job::ProcessCommission(*run_id)).await?;
        }
        info!(year, month, enqueued = report.enqueued.len(), "Monthly batch enqueued");
        Ok(report)
    }

    pub async fn failed_runs(&self) -> Result<Vec<CommissionRun>, SettlementError> {
        self.orchestrator.failed_runs().await
    }
}
