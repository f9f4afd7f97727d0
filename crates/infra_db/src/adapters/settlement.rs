//! PostgreSQL Settlement Store
//!
//! [`PostgresSettlementStore::begin`] opens a database transaction with a
//! bounded `lock_timeout`; the returned [`PgSettlementTx`] serves both the
//! commission and the wallet transaction ports, so a posting's line item
//! update, ledger entry and balance write commit together or not at all.
//!
//! Dropping a `PgSettlementTx` without committing rolls it back.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use core_kernel::{
    AgentCode, CommissionRunId, Currency, DomainPort, HealthCheckResult, HealthCheckable, LineItemId,
    Money, PaymentId, PortError, ValidPeriod, WithdrawalId,
};
use domain_commission::{
    CommissionHistoryPort, CommissionLineItem, CommissionTx, CompletedPayment, PaymentSource,
};
use domain_settlement::{CommissionRun, RunState, RunStore, SettlementStore, SettlementTx};
use domain_wallet::{LedgerTotals, LedgerTx, Wallet, WalletReadPort, WalletTransaction, WithdrawalRequest};

use crate::adapters::mapping::{
    line_item_to_row, payment_to_row, row_to_line_item, row_to_payment, row_to_run,
    row_to_transaction, row_to_wallet, row_to_withdrawal, run_to_row, transaction_to_row,
    wallet_to_row, withdrawal_to_row,
};
use crate::adapters::ping;
use crate::error::DatabaseError;
use crate::repositories::{commission, wallet, PaymentRepository, RunRepository, WalletRepository};

/// PostgreSQL-backed settlement store
#[derive(Debug, Clone)]
pub struct PostgresSettlementStore {
    pool: PgPool,
    payments: PaymentRepository,
    runs: RunRepository,
    wallets: WalletRepository,
    lock_timeout: Duration,
}

impl PostgresSettlementStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self {
            payments: PaymentRepository::new(pool.clone()),
            runs: RunRepository::new(pool.clone()),
            wallets: WalletRepository::new(pool.clone()),
            pool,
            lock_timeout,
        }
    }
}

fn collect<R, T>(
    rows: Vec<R>,
    convert: impl Fn(R) -> Result<T, DatabaseError>,
) -> Result<Vec<T>, PortError> {
    let items = rows
        .into_iter()
        .map(convert)
        .collect::<Result<Vec<_>, DatabaseError>>()?;
    Ok(items)
}

impl DomainPort for PostgresSettlementStore {}

#[async_trait]
impl HealthCheckable for PostgresSettlementStore {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-settlement-store").await
    }
}

#[async_trait]
impl SettlementStore for PostgresSettlementStore {
    async fn begin(&self) -> Result<Box<dyn SettlementTx>, PortError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        // SET does not take bind parameters
        let set_timeout = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from)?;
        Ok(Box::new(PgSettlementTx { tx }))
    }
}

#[async_trait]
impl RunStore for PostgresSettlementStore {
    #[instrument(skip(self, run), fields(run_id = %run.id, payment_id = %run.payment.payment_id))]
    async fn insert_run(&self, run: &CommissionRun) -> Result<(CommissionRun, bool), PortError> {
        let (row, created) = self.runs.insert(&run_to_row(run)?).await?;
        debug!(created, "Run stored");
        Ok((row_to_run(row)?, created))
    }

    async fn get_run(&self, id: CommissionRunId) -> Result<CommissionRun, PortError> {
        let row = self.runs.get(*id.as_uuid()).await?;
        Ok(row_to_run(row)?)
    }

    async fn run_for_payment(&self, payment_id: PaymentId) -> Result<Option<CommissionRun>, PortError> {
        match self.runs.for_payment(*payment_id.as_uuid()).await? {
            Some(row) => Ok(Some(row_to_run(row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(run_id = %id, from = %from, to = %to))]
    async fn transition_run(
        &self,
        id: CommissionRunId,
        from: RunState,
        to: RunState,
        at: DateTime<Utc>,
    ) -> Result<Option<CommissionRun>, PortError> {
        let row = self
            .runs
            .transition(*id.as_uuid(), from.as_str(), to.as_str(), at)
            .await?;
        match row {
            Some(row) => Ok(Some(row_to_run(row)?)),
            None => Ok(None),
        }
    }

    async fn update_run(&self, run: &CommissionRun) -> Result<(), PortError> {
        self.runs.update(&run_to_row(run)?).await?;
        Ok(())
    }

    async fn runs_in_state(&self, state: RunState) -> Result<Vec<CommissionRun>, PortError> {
        let rows = self.runs.in_state(state.as_str()).await?;
        collect(rows, row_to_run)
    }

    #[instrument(skip(self, reason))]
    async fn fail_stale_runs(
        &self,
        claimed_before: DateTime<Utc>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<CommissionRun>, PortError> {
        let rows = self.runs.fail_stale(claimed_before, reason, at).await?;
        if !rows.is_empty() {
            debug!(count = rows.len(), "Stale runs failed");
        }
        collect(rows, row_to_run)
    }
}

#[async_trait]
impl PaymentSource for PostgresSettlementStore {
    #[instrument(skip(self, payment), fields(payment_id = %payment.payment_id))]
    async fn record_payment(&self, payment: &CompletedPayment) -> Result<bool, PortError> {
        Ok(self.payments.insert(&payment_to_row(payment)).await?)
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<CompletedPayment, PortError> {
        let row = self.payments.get(*payment_id.as_uuid()).await?;
        Ok(row_to_payment(row)?)
    }

    async fn payments_completed_in(
        &self,
        period: &ValidPeriod,
    ) -> Result<Vec<CompletedPayment>, PortError> {
        let rows = self.payments.completed_between(period.start, period.end).await?;
        collect(rows, row_to_payment)
    }
}

#[async_trait]
impl CommissionHistoryPort for PostgresSettlementStore {
    async fn line_items_for_agent(
        &self,
        agent_code: &AgentCode,
    ) -> Result<Vec<CommissionLineItem>, PortError> {
        let rows = commission::line_items_for_agent(&self.pool, agent_code.as_str()).await?;
        collect(rows, row_to_line_item)
    }
}

#[async_trait]
impl WalletReadPort for PostgresSettlementStore {
    async fn get_wallet(&self, agent: &AgentCode) -> Result<Option<Wallet>, PortError> {
        match self.wallets.get(agent.as_str()).await? {
            Some(row) => Ok(Some(row_to_wallet(row)?)),
            None => Ok(None),
        }
    }

    async fn transactions_for_agent(
        &self,
        agent: &AgentCode,
    ) -> Result<Vec<WalletTransaction>, PortError> {
        let rows = self.wallets.transactions(agent.as_str()).await?;
        collect(rows, row_to_transaction)
    }

    async fn withdrawals_for_agent(
        &self,
        agent: &AgentCode,
    ) -> Result<Vec<WithdrawalRequest>, PortError> {
        let rows = self.wallets.withdrawals(agent.as_str()).await?;
        collect(rows, row_to_withdrawal)
    }

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalRequest, PortError> {
        let row = self.wallets.withdrawal(*id.as_uuid()).await?;
        Ok(row_to_withdrawal(row)?)
    }
}

/// An open settlement transaction
pub struct PgSettlementTx {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PgSettlementTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSettlementTx").finish_non_exhaustive()
    }
}

#[async_trait]
impl CommissionTx for PgSettlementTx {
    async fn line_items_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<Vec<CommissionLineItem>, PortError> {
        let rows = commission::line_items_for_payment(&mut *self.tx, *payment_id.as_uuid()).await?;
        collect(rows, row_to_line_item)
    }

    async fn insert_line_items(&mut self, items: &[CommissionLineItem]) -> Result<(), PortError> {
        let rows: Vec<_> = items.iter().map(line_item_to_row).collect();
        commission::insert_line_items(&mut *self.tx, &rows).await?;
        Ok(())
    }

    async fn lock_line_item(&mut self, id: LineItemId) -> Result<CommissionLineItem, PortError> {
        let row = commission::lock_line_item(&mut *self.tx, *id.as_uuid()).await?;
        Ok(row_to_line_item(row)?)
    }

    async fn update_line_item(&mut self, item: &CommissionLineItem) -> Result<(), PortError> {
        commission::update_line_item(&mut *self.tx, &line_item_to_row(item)).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for PgSettlementTx {
    async fn lock_wallet(&mut self, agent: &AgentCode, currency: Currency) -> Result<Wallet, PortError> {
        let row = wallet::lock_wallet(&mut *self.tx, agent.as_str(), currency.code(), Utc::now()).await?;
        Ok(row_to_wallet(row)?)
    }

    async fn append_entry(&mut self, entry: &WalletTransaction) -> Result<(), PortError> {
        wallet::append_transaction(&mut *self.tx, &transaction_to_row(entry)?).await?;
        Ok(())
    }

    async fn store_balance(&mut self, wallet: &Wallet) -> Result<(), PortError> {
        wallet::store_balance(&mut *self.tx, &wallet_to_row(wallet)).await?;
        Ok(())
    }

    async fn ledger_totals(
        &mut self,
        agent: &AgentCode,
        currency: Currency,
    ) -> Result<LedgerTotals, PortError> {
        let row = wallet::ledger_totals(&mut *self.tx, agent.as_str()).await?;
        let entry_count = usize::try_from(row.entry_count)
            .map_err(|_| DatabaseError::corrupt("entry_count", row.entry_count))?;
        Ok(LedgerTotals {
            sum: Money::from_minor(row.sum_minor, currency),
            entry_count,
            last_balance_after: row
                .last_balance_after_minor
                .map(|minor| Money::from_minor(minor, currency)),
        })
    }

    async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), PortError> {
        wallet::insert_withdrawal(&mut *self.tx, &withdrawal_to_row(request)).await?;
        Ok(())
    }

    async fn lock_withdrawal(&mut self, id: WithdrawalId) -> Result<WithdrawalRequest, PortError> {
        let row = wallet::lock_withdrawal(&mut *self.tx, *id.as_uuid()).await?;
        Ok(row_to_withdrawal(row)?)
    }

    async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), PortError> {
        wallet::update_withdrawal(&mut *self.tx, &withdrawal_to_row(request)).await?;
        Ok(())
    }

    async fn approved_unpaid_total(
        &mut self,
        agent: &AgentCode,
        currency: Currency,
    ) -> Result<Money, PortError> {
        let total = wallet::approved_unpaid_total(&mut *self.tx, agent.as_str()).await?;
        Ok(Money::from_minor(total, currency))
    }
}

#[async_trait]
impl SettlementTx for PgSettlementTx {
    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        self.tx.commit().await.map_err(DatabaseError::from)?;
        Ok(())
    }
}
