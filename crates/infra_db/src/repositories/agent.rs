//! Agent repository implementation

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::DatabaseError;

/// Row of the `agents` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentRow {
    pub code: String,
    pub name: String,
    pub referrer_code: Option<String>,
    pub status: String,
    pub joined_at: DateTime<Utc>,
}

/// Repository for agent records and referrer links
#[derive(Debug, Clone)]
pub struct AgentRepository {
    pool: PgPool,
}

impl AgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, code: &str) -> Result<Option<AgentRow>, DatabaseError> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT code, name, referrer_code, status, joined_at
            FROM agents
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Inserts or updates an agent
    pub async fn upsert(&self, row: &AgentRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO agents (code, name, referrer_code, status, joined_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (code) DO UPDATE SET
                name = EXCLUDED.name,
                referrer_code = EXCLUDED.referrer_code,
                status = EXCLUDED.status
            "#,
        )
        .bind(&row.code)
        .bind(&row.name)
        .bind(&row.referrer_code)
        .bind(&row.status)
        .bind(row.joined_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Direct recruits of an agent, ordered by code
    pub async fn list_by_referrer(&self, referrer: &str) -> Result<Vec<AgentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT code, name, referrer_code, status, joined_at
            FROM agents
            WHERE referrer_code = $1
            ORDER BY code
            "#,
        )
        .bind(referrer)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
