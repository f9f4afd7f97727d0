//! Commission/Payment Orchestrator
//!
//! Drives a payment from admission to posted wallet credits:
//!
//! 1. `admit_payment` records the payment and a queued [`CommissionRun`]
//! 2. `process_run` claims the run (`queued -> processing`), calculates the
//!    line items in one transaction and posts each pending item through
//!    [`Orchestrator::post_line_item`]
//! 3. Transient failures are retried with the configured backoff, anything
//!    else (and retry exhaustion) fails the run for operator review
//! 4. A run left in `processing` past the processing lease (its worker died
//!    or could not record the outcome) is failed by
//!    [`Orchestrator::expire_stale_runs`], which the monthly batch and the
//!    failed-run listing call first
//!
//! Withdrawals approved upstream are settled through the same retry path.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use core_kernel::{
    AgentCode, Clock, CommissionRunId, LineItemId, Money, PaymentId, PortError, Timezone,
    WithdrawalId,
};
use domain_commission::{
    CommissionEngine, CommissionError, CommissionLineItem, CommissionTx, LineItemStatus,
    PaymentSource,
};
use domain_wallet::{
    LedgerTx, Reconciliation, SourceRef, WalletError, WalletLedger, WalletTransaction,
    WithdrawalRequest, WithdrawalStatus,
};

use crate::config::DEFAULT_PROCESSING_LEASE_SECS;
use crate::error::SettlementError;
use crate::events::{PaymentCompleted, WithdrawalApproved};
use crate::ports::{RunStore, SettlementStore};
use crate::queue::Job;
use crate::retry::RetryPolicy;
use crate::run::{CommissionRun, RunState};

/// Result of settling one payment
#[derive(Debug, Clone, Serialize)]
pub struct PostingSummary {
    pub payment_id: PaymentId,
    /// Line items calculated for the payment
    pub line_items: usize,
    pub total_amount: Money,
    /// Credits posted by this call; empty when everything was posted before
    pub credits: Vec<WalletTransaction>,
    pub reused: bool,
}

/// How a `process_run` call ended
#[derive(Debug)]
pub enum RunOutcome {
    Posted(PostingSummary),
    Failed(SettlementError),
    /// The run was not queued, e.g. claimed by another worker or cancelled
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalOutcome {
    pub request: WithdrawalRequest,
    /// The debit entry, `None` if the request was settled before
    pub transaction: Option<WalletTransaction>,
    pub already_settled: bool,
}

/// Result of the monthly re-scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub year: i32,
    pub month: u32,
    pub payments_scanned: usize,
    /// Runs that must be (re-)enqueued for processing
    pub enqueued: Vec<CommissionRunId>,
    pub runs_created: usize,
    pub runs_requeued: usize,
    /// Processing runs past their lease, failed and then re-queued
    pub runs_expired: usize,
    pub already_posted: usize,
    /// Runs in progress within their lease or cancelled by an operator
    pub skipped: usize,
}

/// Last error recorded on a run whose processing lease ran out
pub const LEASE_EXPIRED_ERROR: &str = "processing lease expired before the run completed";

pub struct Orchestrator {
    store: Arc<dyn SettlementStore>,
    runs: Arc<dyn RunStore>,
    payments: Arc<dyn PaymentSource>,
    engine: CommissionEngine,
    ledger: WalletLedger,
    retry: RetryPolicy,
    processing_lease: Duration,
    timezone: Timezone,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        runs: Arc<dyn RunStore>,
        payments: Arc<dyn PaymentSource>,
        engine: CommissionEngine,
        ledger: WalletLedger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            runs,
            payments,
            engine,
            ledger,
            retry: RetryPolicy::default(),
            processing_lease: Duration::from_secs(DEFAULT_PROCESSING_LEASE_SECS),
            timezone: Timezone::default(),
            clock,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_processing_lease(mut self, lease: Duration) -> Self {
        self.processing_lease = lease;
        self
    }

    pub fn with_timezone(mut self, timezone: Timezone) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn engine(&self) -> &CommissionEngine {
        &self.engine
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.ledger
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Records a completed payment and its queued run
    ///
    /// Admission is idempotent per payment id: a second event for the same
    /// payment returns the existing run and `false`.
    #[instrument(skip(self, event), fields(payment_id = %event.payment_id))]
    pub async fn admit_payment(
        &self,
        event: PaymentCompleted,
    ) -> Result<(CommissionRun, bool), SettlementError> {
        let payment = event.into_payment()?;
        if payment.basis.currency() != self.ledger.currency() {
            return Err(SettlementError::InvalidEvent(format!(
                "payment {} is in {}, wallets are kept in {}",
                payment.payment_id,
                payment.basis.currency(),
                self.ledger.currency()
            )));
        }

        self.payments.record_payment(&payment).await?;
        let (run, created) = self
            .runs
            .insert_run(&CommissionRun::queued(payment, self.now()))
            .await?;

        if created {
            info!(run_id = %run.id, "Commission run queued");
        } else {
            debug!(run_id = %run.id, state = %run.state, "Payment already admitted");
        }
        Ok((run, created))
    }

    /// Processes a queued run to completion
    ///
    /// Only the caller that wins the `queued -> processing` transition does
    /// any work; everyone else gets [`RunOutcome::Skipped`].
    #[instrument(skip(self), fields(run_id = %id))]
    pub async fn process_run(&self, id: CommissionRunId) -> Result<RunOutcome, SettlementError> {
        let claimed = self
            .runs
            .transition_run(id, RunState::Queued, RunState::Processing, self.now())
            .await
            .map_err(|e| run_error(id, e))?;
        let Some(mut run) = claimed else {
            let current = self.runs.get_run(id).await.map_err(|e| run_error(id, e))?;
            debug!(state = %current.state, "Run not queued, skipping");
            return Ok(RunOutcome::Skipped);
        };

        let this = self;
        let payment = &run.payment;
        let (result, attempts) = self
            .with_retry("settle_payment", move || this.settle_payment(payment))
            .await;
        run.attempts = run.attempts.saturating_add(attempts);

        match result {
            Ok(summary) => {
                run.transition(RunState::Posted, self.now())?;
                run.last_error = None;
                self.save_run(&run).await?;
                info!(
                    payment_id = %summary.payment_id,
                    credits = summary.credits.len(),
                    total = %summary.total_amount,
                    "Commission run posted"
                );
                Ok(RunOutcome::Posted(summary))
            }
            Err(e) => {
                error!(
                    payment_id = %run.payment.payment_id,
                    attempts = run.attempts,
                    data_integrity = e.is_data_integrity(),
                    error = %e,
                    "Commission run failed"
                );
                let now = self.now();
                run.record_failure(&e, now);
                run.transition(RunState::Failed, now)?;
                self.save_run(&run).await?;
                Ok(RunOutcome::Failed(e))
            }
        }
    }

    /// Writes the outcome of a processing round, retrying transient failures
    ///
    /// If every attempt fails the run stays `processing` until its lease
    /// expires.
    async fn save_run(&self, run: &CommissionRun) -> Result<(), SettlementError> {
        let runs = &self.runs;
        let (result, attempts) = self
            .with_retry("update_run", move || async move {
                runs.update_run(run).await.map_err(SettlementError::from)
            })
            .await;
        if let Err(e) = &result {
            error!(
                run_id = %run.id,
                state = %run.state,
                attempts,
                error = %e,
                "Run outcome not recorded, left to lease expiry"
            );
        }
        result
    }

    /// Fails every run held in `processing` for longer than the lease
    ///
    /// Failed runs go through the usual operator retry. Replaying one is
    /// safe: calculation reuses stored line items and posted items are
    /// skipped.
    #[instrument(skip(self))]
    pub async fn expire_stale_runs(&self) -> Result<Vec<CommissionRun>, SettlementError> {
        let now = self.now();
        let claimed_before = chrono::Duration::from_std(self.processing_lease)
            .ok()
            .and_then(|lease| now.checked_sub_signed(lease))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let expired = self
            .runs
            .fail_stale_runs(claimed_before, LEASE_EXPIRED_ERROR, now)
            .await?;
        for run in &expired {
            warn!(
                run_id = %run.id,
                payment_id = %run.payment.payment_id,
                claimed_at = ?run.claimed_at,
                "Processing lease expired, run failed"
            );
        }
        Ok(expired)
    }

    /// Calculates the payment's line items and posts every pending one
    ///
    /// Safe to call repeatedly: the calculation reuses stored line items
    /// and posted items are skipped.
    pub async fn settle_payment(
        &self,
        payment: &domain_commission::CompletedPayment,
    ) -> Result<PostingSummary, SettlementError> {
        let mut tx = self.store.begin().await?;
        let calculation = self
            .engine
            .calculate_for_payment(tx.as_mut(), payment, self.clock.as_ref())
            .await?;
        tx.commit().await?;

        let mut credits = Vec::new();
        for item in calculation.line_items.iter().filter(|i| i.is_pending()) {
            if let Some(entry) = self.post_line_item(item.id).await? {
                credits.push(entry);
            }
        }

        Ok(PostingSummary {
            payment_id: payment.payment_id,
            line_items: calculation.line_items.len(),
            total_amount: calculation.total_amount,
            credits,
            reused: calculation.reused,
        })
    }

    /// Posts one line item to its agent's wallet
    ///
    /// Locks the line item and the wallet, appends the credit, marks the item
    /// posted and commits. Both writes land together or not at all.
    ///
    /// # Returns
    ///
    /// The credit entry, or `None` if the item is no longer pending.
    #[instrument(skip(self), fields(line_item_id = %id))]
    pub async fn post_line_item(
        &self,
        id: LineItemId,
    ) -> Result<Option<WalletTransaction>, SettlementError> {
        let clock = self.clock.as_ref();
        let mut tx = self.store.begin().await?;
        let mut item = lock_line_item(tx.as_mut(), id).await?;
        if !item.is_pending() {
            debug!(status = item.status.as_str(), "Line item already handled");
            return Ok(None);
        }

        let entry = self
            .ledger
            .post_credit(
                tx.as_mut(),
                &item.agent_code,
                item.amount,
                SourceRef::line_item(item.id),
                clock,
            )
            .await?;
        item.mark_posted(entry.id, clock.now())?;
        tx.update_line_item(&item).await?;
        tx.commit().await?;

        info!(agent = %item.agent_code, level = item.level, amount = %item.amount, "Line item posted");
        Ok(Some(entry))
    }

    /// Offsets a posted commission and marks the line item reversed
    #[instrument(skip(self, reason), fields(line_item_id = %id, actor = actor))]
    pub async fn reverse_line_item(
        &self,
        id: LineItemId,
        actor: &str,
        reason: &str,
    ) -> Result<WalletTransaction, SettlementError> {
        let clock = self.clock.as_ref();
        let mut tx = self.store.begin().await?;
        let mut item = lock_line_item(tx.as_mut(), id).await?;
        if item.status != LineItemStatus::Posted {
            return Err(SettlementError::LineItemNotPosted(id));
        }

        let entry = self
            .ledger
            .reverse_credit(tx.as_mut(), &item.agent_code, id, item.amount, actor, reason, clock)
            .await?;
        item.mark_reversed(clock.now())?;
        tx.update_line_item(&item).await?;
        tx.commit().await?;

        info!(agent = %item.agent_code, amount = %item.amount, "Line item reversed");
        Ok(entry)
    }

    /// Approves and pays a withdrawal in one transaction
    ///
    /// Creates the request if the approval event is the first the core sees
    /// of it. An insufficient available balance rejects the request and the
    /// error is returned to the caller without retrying.
    #[instrument(skip(self, event), fields(withdrawal_id = %event.request_id, agent = %event.agent_code))]
    pub async fn withdrawal_approved(
        &self,
        event: WithdrawalApproved,
    ) -> Result<WithdrawalOutcome, SettlementError> {
        event.validate()?;
        let this = self;
        let event = &event;
        let (result, _) = self
            .with_retry("settle_withdrawal", move || this.try_withdrawal_approved(event))
            .await;
        result
    }

    async fn try_withdrawal_approved(
        &self,
        event: &WithdrawalApproved,
    ) -> Result<WithdrawalOutcome, SettlementError> {
        let clock = self.clock.as_ref();
        let amount = Money::from_minor(event.amount_minor, self.ledger.currency());
        let mut tx = self.store.begin().await?;

        let request = self.load_or_request(tx.as_mut(), event, amount).await?;
        match request.status {
            WithdrawalStatus::Paid => {
                debug!("Withdrawal already paid");
                return Ok(WithdrawalOutcome {
                    request,
                    transaction: None,
                    already_settled: true,
                });
            }
            WithdrawalStatus::Approved => {}
            WithdrawalStatus::Pending | WithdrawalStatus::Rejected => {
                match self.ledger.approve_withdrawal(tx.as_mut(), event.request_id, clock).await {
                    Ok(_) => {}
                    Err(e @ WalletError::InsufficientFunds { .. }) => {
                        drop(tx);
                        self.reject_insufficient(event, amount).await?;
                        return Err(e.into());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let (request, entry) = self
            .ledger
            .settle_withdrawal(tx.as_mut(), event.request_id, clock)
            .await?;
        tx.commit().await?;
        Ok(WithdrawalOutcome {
            request,
            transaction: Some(entry),
            already_settled: false,
        })
    }

    async fn load_or_request<T>(
        &self,
        tx: &mut T,
        event: &WithdrawalApproved,
        amount: Money,
    ) -> Result<WithdrawalRequest, SettlementError>
    where
        T: LedgerTx + ?Sized,
    {
        match tx.lock_withdrawal(event.request_id).await {
            Ok(existing) => {
                if existing.agent_code != event.agent_code || existing.amount != amount {
                    return Err(SettlementError::InvalidEvent(format!(
                        "withdrawal {} does not match the stored request",
                        event.request_id
                    )));
                }
                Ok(existing)
            }
            Err(e) if e.is_not_found() => Ok(self
                .ledger
                .request_withdrawal(tx, event.request_id, &event.agent_code, amount, self.clock.as_ref())
                .await?),
            Err(e) => Err(e.into()),
        }
    }

    async fn reject_insufficient(
        &self,
        event: &WithdrawalApproved,
        amount: Money,
    ) -> Result<(), SettlementError> {
        let mut tx = self.store.begin().await?;
        let request = self.load_or_request(tx.as_mut(), event, amount).await?;
        if request.status == WithdrawalStatus::Pending {
            self.ledger
                .reject_withdrawal(tx.as_mut(), event.request_id, "insufficient funds", self.clock.as_ref())
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Records an agent's withdrawal request
    pub async fn request_withdrawal(
        &self,
        id: WithdrawalId,
        agent: &AgentCode,
        amount_minor: i64,
    ) -> Result<WithdrawalRequest, SettlementError> {
        let amount = Money::from_minor(amount_minor, self.ledger.currency());
        let mut tx = self.store.begin().await?;
        let request = self
            .ledger
            .request_withdrawal(tx.as_mut(), id, agent, amount, self.clock.as_ref())
            .await?;
        tx.commit().await?;
        Ok(request)
    }

    pub async fn reject_withdrawal(
        &self,
        id: WithdrawalId,
        reason: &str,
    ) -> Result<WithdrawalRequest, SettlementError> {
        let mut tx = self.store.begin().await?;
        let request = self
            .ledger
            .reject_withdrawal(tx.as_mut(), id, reason, self.clock.as_ref())
            .await?;
        tx.commit().await?;
        Ok(request)
    }

    /// Manual signed correction with audit information
    #[instrument(skip(self, reason), fields(agent = %agent, actor = actor))]
    pub async fn adjust_wallet(
        &self,
        agent: &AgentCode,
        signed_minor: i64,
        actor: &str,
        reason: &str,
    ) -> Result<WalletTransaction, SettlementError> {
        let amount = Money::from_minor(signed_minor, self.ledger.currency());
        let mut tx = self.store.begin().await?;
        let entry = self
            .ledger
            .post_adjustment(tx.as_mut(), agent, amount, actor, reason, self.clock.as_ref())
            .await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Compares an agent's cached balance with the ledger
    pub async fn reconcile_wallet(&self, agent: &AgentCode) -> Result<Reconciliation, SettlementError> {
        let mut tx = self.store.begin().await?;
        let report = self.ledger.reconcile(tx.as_mut(), agent).await?;
        if !report.is_consistent() {
            warn!(
                agent = %agent,
                cached = %report.cached_balance,
                ledger = %report.ledger_sum,
                "Wallet balance drift detected"
            );
        }
        Ok(report)
    }

    /// Operator retry of a failed run, `failed -> queued`
    #[instrument(skip(self), fields(run_id = %id))]
    pub async fn retry_run(&self, id: CommissionRunId) -> Result<CommissionRun, SettlementError> {
        let run = self.move_run(id, RunState::Failed, RunState::Queued).await?;
        info!(attempts = run.attempts, "Failed run re-queued by operator");
        Ok(run)
    }

    /// Cancels a run that has not started, `queued -> cancelled`
    #[instrument(skip(self), fields(run_id = %id))]
    pub async fn cancel_run(&self, id: CommissionRunId) -> Result<CommissionRun, SettlementError> {
        let run = self.move_run(id, RunState::Queued, RunState::Cancelled).await?;
        info!("Commission run cancelled");
        Ok(run)
    }

    async fn move_run(
        &self,
        id: CommissionRunId,
        from: RunState,
        to: RunState,
    ) -> Result<CommissionRun, SettlementError> {
        let moved = self
            .runs
            .transition_run(id, from, to, self.now())
            .await
            .map_err(|e| run_error(id, e))?;
        match moved {
            Some(run) => Ok(run),
            None => {
                let current = self.runs.get_run(id).await.map_err(|e| run_error(id, e))?;
                Err(SettlementError::InvalidRunTransition {
                    id,
                    from: current.state.to_string(),
                    to: to.to_string(),
                })
            }
        }
    }

    pub async fn get_run(&self, id: CommissionRunId) -> Result<CommissionRun, SettlementError> {
        self.runs.get_run(id).await.map_err(|e| run_error(id, e))
    }

    /// Runs awaiting operator review, oldest first
    ///
    /// Includes runs whose processing lease has just expired.
    pub async fn failed_runs(&self) -> Result<Vec<CommissionRun>, SettlementError> {
        self.expire_stale_runs().await?;
        Ok(self.runs.runs_in_state(RunState::Failed).await?)
    }

    /// Re-scans the payments completed in a calendar month
    ///
    /// Every payment whose run is not posted ends up queued: missing runs are
    /// created, failed runs and runs past their processing lease are moved
    /// back to queued. The report lists the runs to enqueue; re-running the
    /// batch is harmless because processing claims each run exactly once.
    #[instrument(skip(self))]
    pub async fn monthly_batch(&self, year: i32, month: u32) -> Result<BatchReport, SettlementError> {
        let period = self.timezone.month_period(year, month)?;
        let expired: Vec<CommissionRunId> =
            self.expire_stale_runs().await?.into_iter().map(|r| r.id).collect();
        let payments = self.payments.payments_completed_in(&period).await?;
        let mut report = BatchReport {
            year,
            month,
            payments_scanned: payments.len(),
            ..BatchReport::default()
        };

        for payment in payments {
            let existing = self.runs.run_for_payment(payment.payment_id).await?;
            let run = match existing {
                Some(run) => run,
                None => {
                    let (run, created) = self
                        .runs
                        .insert_run(&CommissionRun::queued(payment, self.now()))
                        .await?;
                    if created {
                        report.runs_created += 1;
                    }
                    run
                }
            };

            match run.state {
                RunState::Queued => report.enqueued.push(run.id),
                RunState::Failed => {
                    let requeued = self
                        .runs
                        .transition_run(run.id, RunState::Failed, RunState::Queued, self.now())
                        .await?;
                    if requeued.is_some() {
                        if expired.contains(&run.id) {
                            report.runs_expired += 1;
                        } else {
                            report.runs_requeued += 1;
                        }
                        report.enqueued.push(run.id);
                    } else {
                        report.skipped += 1;
                    }
                }
                RunState::Posted => report.already_posted += 1,
                RunState::Processing | RunState::Cancelled => report.skipped += 1,
            }
        }

        info!(
            scanned = report.payments_scanned,
            enqueued = report.enqueued.len(),
            created = report.runs_created,
            requeued = report.runs_requeued,
            expired = report.runs_expired,
            posted = report.already_posted,
            "Monthly batch scanned"
        );
        Ok(report)
    }

    /// Executes one queued job
    pub async fn handle(&self, job: Job) {
        match job {
            Job::ProcessCommission(run_id) => {
                if let Err(e) = self.process_run(run_id).await {
                    error!(run_id = %run_id, error = %e, "Commission job could not be processed");
                }
            }
            Job::SettleWithdrawal { event, reply } => {
                let request_id = event.request_id;
                let result = self.withdrawal_approved(event).await;
                if let Err(e) = &result {
                    warn!(withdrawal_id = %request_id, error = %e, "Withdrawal not settled");
                }
                if let Some(reply) = reply {
                    // The submitter may have gone away
                    let _ = reply.send(result);
                }
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut op: F) -> (Result<T, SettlementError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SettlementError>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match op().await {
                Err(e) if e.is_transient() && self.retry.should_retry(attempts) => {
                    let delay = self.retry.delay_after(attempts);
                    warn!(
                        operation,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return (result, attempts),
            }
        }
    }
}

async fn lock_line_item<T>(tx: &mut T, id: LineItemId) -> Result<CommissionLineItem, SettlementError>
where
    T: CommissionTx + ?Sized,
{
    match tx.lock_line_item(id).await {
        Ok(item) => Ok(item),
        Err(e) if e.is_not_found() => Err(CommissionError::LineItemNotFound(id).into()),
        Err(e) => Err(e.into()),
    }
}

fn run_error(id: CommissionRunId, error: PortError) -> SettlementError {
    if error.is_not_found() {
        SettlementError::RunNotFound(id)
    } else {
        error.into()
    }
}
