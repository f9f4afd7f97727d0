//! PostgreSQL Agent Adapter
//!
//! Backs the hierarchy resolver. Every `get_agent` is one primary-key
//! lookup, so an upline walk costs one round trip per level.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{AgentCode, DomainPort, HealthCheckResult, HealthCheckable, PortError};
use domain_agent::{Agent, AgentPort};

use crate::adapters::mapping::{agent_to_row, row_to_agent};
use crate::adapters::ping;
use crate::error::DatabaseError;
use crate::repositories::AgentRepository;

/// PostgreSQL-backed implementation of [`AgentPort`]
#[derive(Debug, Clone)]
pub struct PostgresAgentAdapter {
    repository: AgentRepository,
    pool: PgPool,
}

impl PostgresAgentAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: AgentRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn repository(&self) -> &AgentRepository {
        &self.repository
    }
}

impl DomainPort for PostgresAgentAdapter {}

#[async_trait]
impl HealthCheckable for PostgresAgentAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-agent-adapter").await
    }
}

#[async_trait]
impl AgentPort for PostgresAgentAdapter {
    #[instrument(skip(self), fields(agent_code = %code))]
    async fn get_agent(&self, code: &AgentCode) -> Result<Agent, PortError> {
        debug!("Fetching agent");
        let row = self
            .repository
            .get(code.as_str())
            .await?
            .ok_or_else(|| PortError::not_found("Agent", code))?;
        Ok(row_to_agent(row)?)
    }

    #[instrument(skip(self, agent), fields(agent_code = %agent.code))]
    async fn save_agent(&self, agent: &Agent) -> Result<(), PortError> {
        debug!("Saving agent");
        self.repository.upsert(&agent_to_row(agent)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(agent_code = %code))]
    async fn list_downline(&self, code: &AgentCode) -> Result<Vec<Agent>, PortError> {
        let rows = self.repository.list_by_referrer(code.as_str()).await?;
        let agents = rows
            .into_iter()
            .map(row_to_agent)
            .collect::<Result<Vec<_>, DatabaseError>>()?;
        Ok(agents)
    }
}
