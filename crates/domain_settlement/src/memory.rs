//! In-memory settlement store
//!
//! A serialized unit-of-work store: `begin` takes one exclusive lock over
//! the commission and wallet state of every agent and works on a private
//! copy; `commit` writes the copy back, dropping the handle discards it.
//! Transactions therefore never interleave, so races between writers to the
//! same wallet are only exercised against PostgreSQL. Runs and payments live
//! outside the transactional state, mirroring their separate tables.
//!
//! Used by the test suites and by deployments without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use core_kernel::{
    AdapterHealth, AgentCode, Clock, CommissionRunId, Currency, DomainPort, HealthCheckResult,
    HealthCheckable, LineItemId, Money, PaymentId, PortError, SystemClock, ValidPeriod,
    WithdrawalId,
};
use domain_commission::{
    CommissionHistoryPort, CommissionLineItem, CommissionTx, CompletedPayment, PaymentSource,
};
use domain_wallet::{
    LedgerTotals, LedgerTx, Wallet, WalletReadPort, WalletTransaction, WithdrawalRequest,
    WithdrawalStatus,
};

use crate::ports::{RunStore, SettlementStore, SettlementTx};
use crate::run::{CommissionRun, RunState};

#[derive(Debug, Default, Clone)]
struct LedgerState {
    wallets: HashMap<AgentCode, Wallet>,
    entries: Vec<WalletTransaction>,
    withdrawals: HashMap<WithdrawalId, WithdrawalRequest>,
    line_items: Vec<CommissionLineItem>,
}

/// In-memory implementation of every settlement-side port
#[derive(Debug)]
pub struct InMemorySettlementStore {
    state: Arc<Mutex<LedgerState>>,
    runs: RwLock<HashMap<CommissionRunId, CommissionRun>>,
    payments: RwLock<HashMap<PaymentId, CompletedPayment>>,
    clock: Arc<dyn Clock>,
    commit_failures: AtomicUsize,
    run_update_failures: AtomicUsize,
    commits: Arc<AtomicUsize>,
}

impl Default for InMemorySettlementStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemorySettlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that timestamps new wallets with `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::default(),
            runs: RwLock::default(),
            payments: RwLock::default(),
            clock,
            commit_failures: AtomicUsize::new(0),
            run_update_failures: AtomicUsize::new(0),
            commits: Arc::default(),
        }
    }

    /// Makes the next `n` transactions fail at commit with lock contention
    pub fn fail_next_commits(&self, n: usize) {
        self.commit_failures.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` run updates fail with lock contention
    pub fn fail_next_run_updates(&self, n: usize) {
        self.run_update_failures.store(n, Ordering::SeqCst);
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Overwrites a cached wallet balance, bypassing the ledger
    pub async fn corrupt_balance(&self, agent: &AgentCode, balance: Money) {
        if let Some(wallet) = self.state.lock().await.wallets.get_mut(agent) {
            wallet.balance = balance;
        }
    }

    pub async fn all_line_items(&self) -> Vec<CommissionLineItem> {
        self.state.lock().await.line_items.clone()
    }

    pub async fn all_entries(&self) -> Vec<WalletTransaction> {
        self.state.lock().await.entries.clone()
    }
}

/// Open transaction over [`InMemorySettlementStore`]
pub struct InMemoryTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
    clock: Arc<dyn Clock>,
    fail_commit: bool,
    commits: Arc<AtomicUsize>,
}

impl DomainPort for InMemorySettlementStore {}

#[async_trait]
impl HealthCheckable for InMemorySettlementStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "in-memory-settlement-store".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: None,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl SettlementStore for InMemorySettlementStore {
    async fn begin(&self) -> Result<Box<dyn SettlementTx>, PortError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        let fail_commit = self
            .commit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(Box::new(InMemoryTx {
            guard,
            working,
            clock: self.clock.clone(),
            fail_commit,
            commits: self.commits.clone(),
        }))
    }
}

#[async_trait]
impl SettlementTx for InMemoryTx {
    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        if self.fail_commit {
            return Err(PortError::contention(
                "could not serialize access due to concurrent update",
            ));
        }
        let InMemoryTx {
            mut guard,
            working,
            commits,
            ..
        } = *self;
        *guard = working;
        commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl CommissionTx for InMemoryTx {
    async fn line_items_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<Vec<CommissionLineItem>, PortError> {
        let mut items: Vec<_> = self
            .working
            .line_items
            .iter()
            .filter(|i| i.payment_id == payment_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.level);
        Ok(items)
    }

    async fn insert_line_items(&mut self, items: &[CommissionLineItem]) -> Result<(), PortError> {
        for item in items {
            let duplicate = self
                .working
                .line_items
                .iter()
                .any(|i| i.payment_id == item.payment_id && i.level == item.level);
            if duplicate {
                return Err(PortError::conflict(format!(
                    "line item for {} level {} already exists",
                    item.payment_id, item.level
                )));
            }
        }
        self.working.line_items.extend_from_slice(items);
        Ok(())
    }

    async fn lock_line_item(&mut self, id: LineItemId) -> Result<CommissionLineItem, PortError> {
        self.working
            .line_items
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| PortError::not_found("CommissionLineItem", id))
    }

    async fn update_line_item(&mut self, item: &CommissionLineItem) -> Result<(), PortError> {
        let slot = self
            .working
            .line_items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| PortError::not_found("CommissionLineItem", item.id))?;
        *slot = item.clone();
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn lock_wallet(&mut self, agent: &AgentCode, currency: Currency) -> Result<Wallet, PortError> {
        let now = self.clock.now();
        Ok(self
            .working
            .wallets
            .entry(agent.clone())
            .or_insert_with(|| Wallet::empty(agent.clone(), currency, now))
            .clone())
    }

    async fn append_entry(&mut self, entry: &WalletTransaction) -> Result<(), PortError> {
        self.working.entries.push(entry.clone());
        Ok(())
    }

    async fn store_balance(&mut self, wallet: &Wallet) -> Result<(), PortError> {
        self.working
            .wallets
            .insert(wallet.agent_code.clone(), wallet.clone());
        Ok(())
    }

    async fn ledger_totals(
        &mut self,
        agent: &AgentCode,
        currency: Currency,
    ) -> Result<LedgerTotals, PortError> {
        let entries: Vec<&WalletTransaction> = self
            .working
            .entries
            .iter()
            .filter(|e| &e.agent_code == agent)
            .collect();
        let sum = Money::sum(currency, entries.iter().map(|e| &e.amount))
            .map_err(|e| PortError::internal(e.to_string()))?;
        Ok(LedgerTotals {
            sum,
            entry_count: entries.len(),
            last_balance_after: entries.last().map(|e| e.balance_after),
        })
    }

    async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), PortError> {
        if self.working.withdrawals.contains_key(&request.id) {
            return Err(PortError::conflict(format!(
                "withdrawal {} already exists",
                request.id
            )));
        }
        self.working.withdrawals.insert(request.id, request.clone());
        Ok(())
    }

    async fn lock_withdrawal(&mut self, id: WithdrawalId) -> Result<WithdrawalRequest, PortError> {
        self.working
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("WithdrawalRequest", id))
    }

    async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), PortError> {
        self.working.withdrawals.insert(request.id, request.clone());
        Ok(())
    }

    async fn approved_unpaid_total(
        &mut self,
        agent: &AgentCode,
        currency: Currency,
    ) -> Result<Money, PortError> {
        let approved: Vec<Money> = self
            .working
            .withdrawals
            .values()
            .filter(|w| &w.agent_code == agent && w.status == WithdrawalStatus::Approved)
            .map(|w| w.amount)
            .collect();
        Money::sum(currency, approved.iter()).map_err(|e| PortError::internal(e.to_string()))
    }
}

#[async_trait]
impl RunStore for InMemorySettlementStore {
    async fn insert_run(&self, run: &CommissionRun) -> Result<(CommissionRun, bool), PortError> {
        let mut runs = self.runs.write().await;
        if let Some(existing) = runs
            .values()
            .find(|r| r.payment.payment_id == run.payment.payment_id)
        {
            return Ok((existing.clone(), false));
        }
        runs.insert(run.id, run.clone());
        Ok((run.clone(), true))
    }

    async fn get_run(&self, id: CommissionRunId) -> Result<CommissionRun, PortError> {
        self.runs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("CommissionRun", id))
    }

    async fn run_for_payment(&self, payment_id: PaymentId) -> Result<Option<CommissionRun>, PortError> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .find(|r| r.payment.payment_id == payment_id)
            .cloned())
    }

    async fn transition_run(
        &self,
        id: CommissionRunId,
        from: RunState,
        to: RunState,
        at: DateTime<Utc>,
    ) -> Result<Option<CommissionRun>, PortError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| PortError::not_found("CommissionRun", id))?;
        if run.state != from {
            return Ok(None);
        }
        run.state = to;
        run.updated_at = at;
        if to == RunState::Processing {
            run.claimed_at = Some(at);
        }
        Ok(Some(run.clone()))
    }

    async fn update_run(&self, run: &CommissionRun) -> Result<(), PortError> {
        let injected = self
            .run_update_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PortError::contention("canceling statement due to lock timeout"));
        }
        let mut runs = self.runs.write().await;
        if !runs.contains_key(&run.id) {
            return Err(PortError::not_found("CommissionRun", run.id));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn runs_in_state(&self, state: RunState) -> Result<Vec<CommissionRun>, PortError> {
        let mut runs: Vec<_> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.state == state)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(runs)
    }

    async fn fail_stale_runs(
        &self,
        claimed_before: DateTime<Utc>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<CommissionRun>, PortError> {
        let mut runs = self.runs.write().await;
        let mut failed: Vec<CommissionRun> = Vec::new();
        for run in runs.values_mut().filter(|r| r.is_stale(claimed_before)) {
            run.state = RunState::Failed;
            run.last_error = Some(reason.to_string());
            run.updated_at = at;
            failed.push(run.clone());
        }
        failed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(failed)
    }
}

#[async_trait]
impl PaymentSource for InMemorySettlementStore {
    async fn record_payment(&self, payment: &CompletedPayment) -> Result<bool, PortError> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.payment_id) {
            return Ok(false);
        }
        payments.insert(payment.payment_id, payment.clone());
        Ok(true)
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<CompletedPayment, PortError> {
        self.payments
            .read()
            .await
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Payment", payment_id))
    }

    async fn payments_completed_in(
        &self,
        period: &ValidPeriod,
    ) -> Result<Vec<CompletedPayment>, PortError> {
        let mut payments: Vec<_> = self
            .payments
            .read()
            .await
            .values()
            .filter(|p| period.contains(p.completed_at))
            .cloned()
            .collect();
        payments.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then(a.payment_id.cmp(&b.payment_id))
        });
        Ok(payments)
    }
}

#[async_trait]
impl CommissionHistoryPort for InMemorySettlementStore {
    async fn line_items_for_agent(
        &self,
        agent_code: &AgentCode,
    ) -> Result<Vec<CommissionLineItem>, PortError> {
        let state = self.state.lock().await;
        let mut items: Vec<_> = state
            .line_items
            .iter()
            .filter(|i| &i.agent_code == agent_code)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(items)
    }
}

#[async_trait]
impl WalletReadPort for InMemorySettlementStore {
    async fn get_wallet(&self, agent: &AgentCode) -> Result<Option<Wallet>, PortError> {
        Ok(self.state.lock().await.wallets.get(agent).cloned())
    }

    async fn transactions_for_agent(
        &self,
        agent: &AgentCode,
    ) -> Result<Vec<WalletTransaction>, PortError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .rev()
            .filter(|e| &e.agent_code == agent)
            .cloned()
            .collect())
    }

    async fn withdrawals_for_agent(
        &self,
        agent: &AgentCode,
    ) -> Result<Vec<WithdrawalRequest>, PortError> {
        let state = self.state.lock().await;
        let mut requests: Vec<_> = state
            .withdrawals
            .values()
            .filter(|w| &w.agent_code == agent)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(requests)
    }

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalRequest, PortError> {
        self.state
            .lock()
            .await
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("WithdrawalRequest", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_kernel::FixedClock;

    #[tokio::test]
    async fn test_new_wallet_takes_store_clock() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap();
        let store = InMemorySettlementStore::with_clock(Arc::new(FixedClock::new(at)));

        let mut tx = store.begin().await.unwrap();
        let wallet = tx.lock_wallet(&AgentCode::new("B"), Currency::MYR).await.unwrap();
        assert_eq!(wallet.updated_at, at);
        assert!(wallet.balance.is_zero());
    }

    #[tokio::test]
    async fn test_stale_runs_fail_once() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap();
        let store = InMemorySettlementStore::new();
        let payment = CompletedPayment {
            payment_id: PaymentId::new(),
            policy_id: core_kernel::PolicyId::new(),
            agent_code: AgentCode::new("A"),
            plan_id: core_kernel::PlanId::new("LIFE01"),
            frequency: domain_commission::PaymentFrequency::Monthly,
            basis: Money::from_minor(10_000, Currency::MYR),
            completed_at: at,
        };
        let (run, _) = store.insert_run(&CommissionRun::queued(payment, at)).await.unwrap();
        store
            .transition_run(run.id, RunState::Queued, RunState::Processing, at)
            .await
            .unwrap();

        let later = at + chrono::Duration::minutes(30);
        let failed = store.fail_stale_runs(later, "lease expired", later).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].state, RunState::Failed);
        assert_eq!(failed[0].last_error.as_deref(), Some("lease expired"));

        assert!(store.fail_stale_runs(later, "lease expired", later).await.unwrap().is_empty());
    }
}
