//! Commission run repository implementation

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

/// Row of the `commission_runs` table
///
/// The payment is kept as a JSONB snapshot so a run can be reprocessed
/// without joining back to `commission_payments`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub run_id: Uuid,
    pub payment_id: Uuid,
    pub payment: serde_json::Value,
    pub state: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const RUN_COLUMNS: &str =
    "run_id, payment_id, payment, state, attempts, last_error, claimed_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct RunRepository {
    pool: PgPool,
}

impl RunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a run unless the payment already has one
    ///
    /// # Returns
    ///
    /// The stored row and whether it was inserted by this call
    pub async fn insert(&self, row: &RunRow) -> Result<(RunRow, bool), DatabaseError> {
        let sql = format!(
            "INSERT INTO commission_runs ({RUN_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (payment_id) DO NOTHING \
             RETURNING {RUN_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, RunRow>(&sql)
            .bind(row.run_id)
            .bind(row.payment_id)
            .bind(&row.payment)
            .bind(&row.state)
            .bind(row.attempts)
            .bind(&row.last_error)
            .bind(row.claimed_at)
            .bind(row.created_at)
            .bind(row.updated_at)
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(stored) => Ok((stored, true)),
            None => {
                let existing = self
                    .for_payment(row.payment_id)
                    .await?
                    .ok_or_else(|| DatabaseError::not_found("CommissionRun", row.payment_id))?;
                Ok((existing, false))
            }
        }
    }

    pub async fn get(&self, run_id: Uuid) -> Result<RunRow, DatabaseError> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM commission_runs WHERE run_id = $1");
        sqlx::query_as::<_, RunRow>(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("CommissionRun", run_id))
    }

    pub async fn for_payment(&self, payment_id: Uuid) -> Result<Option<RunRow>, DatabaseError> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM commission_runs WHERE payment_id = $1");
        let row = sqlx::query_as::<_, RunRow>(&sql)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Compare-and-set on the run state
    ///
    /// Returns `None` when the run exists but is not in `from`. Moving into
    /// `processing` stamps `claimed_at`.
    pub async fn transition(
        &self,
        run_id: Uuid,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<RunRow>, DatabaseError> {
        let sql = format!(
            "UPDATE commission_runs SET state = $3, updated_at = $4, \
                 claimed_at = CASE WHEN $3 = 'processing' THEN $4 ELSE claimed_at END \
             WHERE run_id = $1 AND state = $2 \
             RETURNING {RUN_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RunRow>(&sql)
            .bind(run_id)
            .bind(from)
            .bind(to)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        if row.is_none() {
            // distinguish "wrong state" from "no such run"
            self.get(run_id).await?;
        }
        Ok(row)
    }

    pub async fn update(&self, row: &RunRow) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE commission_runs
            SET state = $2, attempts = $3, last_error = $4, claimed_at = $5, updated_at = $6
            WHERE run_id = $1
            "#,
        )
        .bind(row.run_id)
        .bind(&row.state)
        .bind(row.attempts)
        .bind(&row.last_error)
        .bind(row.claimed_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("CommissionRun", row.run_id));
        }
        Ok(())
    }

    /// Runs in a state, oldest first
    pub async fn in_state(&self, state: &str) -> Result<Vec<RunRow>, DatabaseError> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM commission_runs WHERE state = $1 ORDER BY created_at, run_id"
        );
        let rows = sqlx::query_as::<_, RunRow>(&sql)
            .bind(state)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Fails `processing` runs whose claim is older than `claimed_before`
    ///
    /// A single conditional UPDATE, so concurrent callers never fail the
    /// same run twice.
    pub async fn fail_stale(
        &self,
        claimed_before: DateTime<Utc>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<RunRow>, DatabaseError> {
        let sql = format!(
            "UPDATE commission_runs SET state = 'failed', last_error = $2, updated_at = $3 \
             WHERE state = 'processing' AND COALESCE(claimed_at, updated_at) < $1 \
             RETURNING {RUN_COLUMNS}"
        );
        let mut rows = sqlx::query_as::<_, RunRow>(&sql)
            .bind(claimed_before)
            .bind(reason)
            .bind(at)
            .fetch_all(&self.pool)
            .await?;
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.run_id.cmp(&b.run_id)));
        Ok(rows)
    }
}
