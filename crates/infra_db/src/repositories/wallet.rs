//! Wallet repository implementation
//!
//! Writes take a `PgConnection` borrowed from the settlement transaction.
//! `lock_wallet` and `lock_withdrawal` use `FOR UPDATE`, so concurrent
//! settlements for one agent serialize on the wallet row.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Row of the `wallets` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WalletRow {
    pub agent_code: String,
    pub balance_minor: i64,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

/// Row of the `wallet_transactions` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WalletTransactionRow {
    pub transaction_id: Uuid,
    pub agent_code: String,
    pub kind: String,
    pub amount_minor: i64,
    pub balance_after_minor: i64,
    pub currency: String,
    pub source_type: String,
    pub source: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Row of the `withdrawal_requests` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WithdrawalRow {
    pub withdrawal_id: Uuid,
    pub agent_code: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub transaction_id: Option<Uuid>,
}

/// Aggregates over an agent's ledger
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TotalsRow {
    pub sum_minor: i64,
    pub entry_count: i64,
    pub last_balance_after_minor: Option<i64>,
}

const TRANSACTION_COLUMNS: &str = "transaction_id, agent_code, kind, amount_minor, \
     balance_after_minor, currency, source_type, source, created_at";

const WITHDRAWAL_COLUMNS: &str = "withdrawal_id, agent_code, amount_minor, currency, status, \
     requested_at, decided_at, paid_at, rejection_reason, transaction_id";

/// Locks the wallet row, creating an empty wallet on first use
pub async fn lock_wallet(
    conn: &mut PgConnection,
    agent_code: &str,
    currency: &str,
    now: DateTime<Utc>,
) -> Result<WalletRow, DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO wallets (agent_code, balance_minor, currency, updated_at)
        VALUES ($1, 0, $2, $3)
        ON CONFLICT (agent_code) DO NOTHING
        "#,
    )
    .bind(agent_code)
    .bind(currency)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query_as::<_, WalletRow>(
        r#"
        SELECT agent_code, balance_minor, currency, updated_at
        FROM wallets
        WHERE agent_code = $1
        FOR UPDATE
        "#,
    )
    .bind(agent_code)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn append_transaction(
    conn: &mut PgConnection,
    row: &WalletTransactionRow,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO wallet_transactions (
            transaction_id, agent_code, kind, amount_minor, balance_after_minor,
            currency, source_type, source, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(row.transaction_id)
    .bind(&row.agent_code)
    .bind(&row.kind)
    .bind(row.amount_minor)
    .bind(row.balance_after_minor)
    .bind(&row.currency)
    .bind(&row.source_type)
    .bind(&row.source)
    .bind(row.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn store_balance(conn: &mut PgConnection, row: &WalletRow) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE wallets SET balance_minor = $2, updated_at = $3
        WHERE agent_code = $1
        "#,
    )
    .bind(&row.agent_code)
    .bind(row.balance_minor)
    .bind(row.updated_at)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("Wallet", &row.agent_code));
    }
    Ok(())
}

/// Sum, count and newest `balance_after` of an agent's entries
pub async fn ledger_totals(
    conn: &mut PgConnection,
    agent_code: &str,
) -> Result<TotalsRow, DatabaseError> {
    let row = sqlx::query_as::<_, TotalsRow>(
        r#"
        SELECT
            COALESCE(SUM(amount_minor), 0)::BIGINT AS sum_minor,
            COUNT(*) AS entry_count,
            (SELECT balance_after_minor FROM wallet_transactions
             WHERE agent_code = $1 ORDER BY seq DESC LIMIT 1) AS last_balance_after_minor
        FROM wallet_transactions
        WHERE agent_code = $1
        "#,
    )
    .bind(agent_code)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn insert_withdrawal(conn: &mut PgConnection, row: &WithdrawalRow) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO withdrawal_requests (
            withdrawal_id, agent_code, amount_minor, currency, status,
            requested_at, decided_at, paid_at, rejection_reason, transaction_id
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(row.withdrawal_id)
    .bind(&row.agent_code)
    .bind(row.amount_minor)
    .bind(&row.currency)
    .bind(&row.status)
    .bind(row.requested_at)
    .bind(row.decided_at)
    .bind(row.paid_at)
    .bind(&row.rejection_reason)
    .bind(row.transaction_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn lock_withdrawal(
    conn: &mut PgConnection,
    withdrawal_id: Uuid,
) -> Result<WithdrawalRow, DatabaseError> {
    let sql = format!(
        "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests \
         WHERE withdrawal_id = $1 FOR UPDATE"
    );
    sqlx::query_as::<_, WithdrawalRow>(&sql)
        .bind(withdrawal_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::not_found("WithdrawalRequest", withdrawal_id))
}

pub async fn update_withdrawal(conn: &mut PgConnection, row: &WithdrawalRow) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE withdrawal_requests
        SET status = $2, decided_at = $3, paid_at = $4, rejection_reason = $5, transaction_id = $6
        WHERE withdrawal_id = $1
        "#,
    )
    .bind(row.withdrawal_id)
    .bind(&row.status)
    .bind(row.decided_at)
    .bind(row.paid_at)
    .bind(&row.rejection_reason)
    .bind(row.transaction_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("WithdrawalRequest", row.withdrawal_id));
    }
    Ok(())
}

pub async fn approved_unpaid_total(
    conn: &mut PgConnection,
    agent_code: &str,
) -> Result<i64, DatabaseError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount_minor), 0)::BIGINT
        FROM withdrawal_requests
        WHERE agent_code = $1 AND status = 'approved'
        "#,
    )
    .bind(agent_code)
    .fetch_one(conn)
    .await?;
    Ok(total)
}

/// Read-only access to committed wallet state
#[derive(Debug, Clone)]
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, agent_code: &str) -> Result<Option<WalletRow>, DatabaseError> {
        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT agent_code, balance_minor, currency, updated_at FROM wallets WHERE agent_code = $1",
        )
        .bind(agent_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Ledger entries, newest first
    pub async fn transactions(&self, agent_code: &str) -> Result<Vec<WalletTransactionRow>, DatabaseError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions \
             WHERE agent_code = $1 ORDER BY seq DESC"
        );
        let rows = sqlx::query_as::<_, WalletTransactionRow>(&sql)
            .bind(agent_code)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Withdrawal requests, newest first
    pub async fn withdrawals(&self, agent_code: &str) -> Result<Vec<WithdrawalRow>, DatabaseError> {
        let sql = format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests \
             WHERE agent_code = $1 ORDER BY requested_at DESC, withdrawal_id DESC"
        );
        let rows = sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(agent_code)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn withdrawal(&self, withdrawal_id: Uuid) -> Result<WithdrawalRow, DatabaseError> {
        let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE withdrawal_id = $1");
        sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(withdrawal_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("WithdrawalRequest", withdrawal_id))
    }
}
