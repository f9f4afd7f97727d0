//! Commission repository implementation
//!
//! Rules and payments are read through the pool. Line item writes take a
//! connection so they run inside the caller's settlement transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Row of the `commission_rules` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommissionRuleRow {
    pub rule_id: Uuid,
    pub plan_id: String,
    pub tier_level: i16,
    pub frequency: String,
    pub basis_type: String,
    pub percentage: Option<Decimal>,
    pub fixed_amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub active: bool,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Row of the `commission_payments` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRow {
    pub payment_id: Uuid,
    pub policy_id: Uuid,
    pub agent_code: String,
    pub plan_id: String,
    pub frequency: String,
    pub basis_minor: i64,
    pub currency: String,
    pub completed_at: DateTime<Utc>,
}

/// Row of the `commission_line_items` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LineItemRow {
    pub line_item_id: Uuid,
    pub payment_id: Uuid,
    pub agent_code: String,
    pub level: i16,
    pub basis_minor: i64,
    pub amount_minor: i64,
    pub currency: String,
    pub rule_id: Uuid,
    pub status: String,
    pub wallet_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
}

const RULE_COLUMNS: &str = "rule_id, plan_id, tier_level, frequency, basis_type, percentage, \
     fixed_amount_minor, currency, active, effective_from, effective_to, created_at";

const LINE_ITEM_COLUMNS: &str = "line_item_id, payment_id, agent_code, level, basis_minor, \
     amount_minor, currency, rule_id, status, wallet_transaction_id, created_at, posted_at, \
     reversed_at";

/// Repository for the commission rule table
#[derive(Debug, Clone)]
pub struct CommissionRuleRepository {
    pool: PgPool,
}

impl CommissionRuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every rule for a (plan, tier, frequency) key, active or not
    pub async fn find_by_key(
        &self,
        plan_id: &str,
        tier_level: i16,
        frequency: &str,
    ) -> Result<Vec<CommissionRuleRow>, DatabaseError> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM commission_rules \
             WHERE plan_id = $1 AND tier_level = $2 AND frequency = $3 \
             ORDER BY created_at, rule_id"
        );
        let rows = sqlx::query_as::<_, CommissionRuleRow>(&sql)
            .bind(plan_id)
            .bind(tier_level)
            .bind(frequency)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn find_by_plan(&self, plan_id: &str) -> Result<Vec<CommissionRuleRow>, DatabaseError> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM commission_rules \
             WHERE plan_id = $1 \
             ORDER BY tier_level, frequency, created_at, rule_id"
        );
        let rows = sqlx::query_as::<_, CommissionRuleRow>(&sql)
            .bind(plan_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, rule_id: Uuid) -> Result<CommissionRuleRow, DatabaseError> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM commission_rules WHERE rule_id = $1");
        sqlx::query_as::<_, CommissionRuleRow>(&sql)
            .bind(rule_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("CommissionRule", rule_id))
    }

    /// Upserts a batch of rules in one transaction
    ///
    /// A supersede closes one rule and inserts another; both must land
    /// together.
    pub async fn save_all(&self, rows: &[CommissionRuleRow]) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO commission_rules (
                    rule_id, plan_id, tier_level, frequency, basis_type, percentage,
                    fixed_amount_minor, currency, active, effective_from, effective_to, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (rule_id) DO UPDATE SET
                    active = EXCLUDED.active,
                    effective_from = EXCLUDED.effective_from,
                    effective_to = EXCLUDED.effective_to
                "#,
            )
            .bind(row.rule_id)
            .bind(&row.plan_id)
            .bind(row.tier_level)
            .bind(&row.frequency)
            .bind(&row.basis_type)
            .bind(row.percentage)
            .bind(row.fixed_amount_minor)
            .bind(&row.currency)
            .bind(row.active)
            .bind(row.effective_from)
            .bind(row.effective_to)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Repository for completed payments
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stores a payment unless it is already known
    ///
    /// # Returns
    ///
    /// `true` if the payment was inserted
    pub async fn insert(&self, row: &PaymentRow) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO commission_payments (
                payment_id, policy_id, agent_code, plan_id, frequency,
                basis_minor, currency, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (payment_id) DO NOTHING
            "#,
        )
        .bind(row.payment_id)
        .bind(row.policy_id)
        .bind(&row.agent_code)
        .bind(&row.plan_id)
        .bind(&row.frequency)
        .bind(row.basis_minor)
        .bind(&row.currency)
        .bind(row.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get(&self, payment_id: Uuid) -> Result<PaymentRow, DatabaseError> {
        sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, policy_id, agent_code, plan_id, frequency,
                   basis_minor, currency, completed_at
            FROM commission_payments
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Payment", payment_id))
    }

    /// Payments completed in `[start, end)`, oldest first
    pub async fn completed_between(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<PaymentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, policy_id, agent_code, plan_id, frequency,
                   basis_minor, currency, completed_at
            FROM commission_payments
            WHERE completed_at >= $1 AND ($2::timestamptz IS NULL OR completed_at < $2)
            ORDER BY completed_at, payment_id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

pub async fn line_items_for_payment(
    conn: &mut PgConnection,
    payment_id: Uuid,
) -> Result<Vec<LineItemRow>, DatabaseError> {
    let sql = format!(
        "SELECT {LINE_ITEM_COLUMNS} FROM commission_line_items \
         WHERE payment_id = $1 ORDER BY level"
    );
    let rows = sqlx::query_as::<_, LineItemRow>(&sql)
        .bind(payment_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

/// Inserts all line items of a payment in one statement
///
/// The `(payment_id, level)` unique constraint rejects the whole batch if a
/// concurrent calculation got there first.
pub async fn insert_line_items(
    conn: &mut PgConnection,
    rows: &[LineItemRow],
) -> Result<(), DatabaseError> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO commission_line_items ({LINE_ITEM_COLUMNS}) "
    ));
    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.line_item_id)
            .push_bind(row.payment_id)
            .push_bind(&row.agent_code)
            .push_bind(row.level)
            .push_bind(row.basis_minor)
            .push_bind(row.amount_minor)
            .push_bind(&row.currency)
            .push_bind(row.rule_id)
            .push_bind(&row.status)
            .push_bind(row.wallet_transaction_id)
            .push_bind(row.created_at)
            .push_bind(row.posted_at)
            .push_bind(row.reversed_at);
    });
    builder.build().execute(conn).await?;
    Ok(())
}

/// Reads a line item and holds its row lock until the transaction ends
pub async fn lock_line_item(
    conn: &mut PgConnection,
    line_item_id: Uuid,
) -> Result<LineItemRow, DatabaseError> {
    let sql = format!(
        "SELECT {LINE_ITEM_COLUMNS} FROM commission_line_items \
         WHERE line_item_id = $1 FOR UPDATE"
    );
    sqlx::query_as::<_, LineItemRow>(&sql)
        .bind(line_item_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::not_found("CommissionLineItem", line_item_id))
}

pub async fn update_line_item(conn: &mut PgConnection, row: &LineItemRow) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE commission_line_items
        SET status = $2, wallet_transaction_id = $3, posted_at = $4, reversed_at = $5
        WHERE line_item_id = $1
        "#,
    )
    .bind(row.line_item_id)
    .bind(&row.status)
    .bind(row.wallet_transaction_id)
    .bind(row.posted_at)
    .bind(row.reversed_at)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("CommissionLineItem", row.line_item_id));
    }
    Ok(())
}

/// Line items earned by an agent, newest first
pub async fn line_items_for_agent(
    pool: &PgPool,
    agent_code: &str,
) -> Result<Vec<LineItemRow>, DatabaseError> {
    let sql = format!(
        "SELECT {LINE_ITEM_COLUMNS} FROM commission_line_items \
         WHERE agent_code = $1 ORDER BY created_at DESC, line_item_id DESC"
    );
    let rows = sqlx::query_as::<_, LineItemRow>(&sql)
        .bind(agent_code)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
