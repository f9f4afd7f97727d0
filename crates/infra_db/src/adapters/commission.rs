//! PostgreSQL Commission Rule Adapter

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{CommissionRuleId, DomainPort, HealthCheckResult, HealthCheckable, PlanId, PortError};
use domain_commission::{CommissionRule, CommissionRulePort, RuleKey};

use crate::adapters::mapping::{row_to_rule, rule_to_row};
use crate::adapters::ping;
use crate::error::DatabaseError;
use crate::repositories::{CommissionRuleRepository, CommissionRuleRow};

/// PostgreSQL-backed implementation of [`CommissionRulePort`]
///
/// Returns every stored candidate for a key; picking the applicable rule is
/// left to `domain_commission::select_rule`.
#[derive(Debug, Clone)]
pub struct PostgresCommissionRuleAdapter {
    repository: CommissionRuleRepository,
    pool: PgPool,
}

impl PostgresCommissionRuleAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: CommissionRuleRepository::new(pool.clone()),
            pool,
        }
    }
}

fn to_rules(rows: Vec<CommissionRuleRow>) -> Result<Vec<CommissionRule>, PortError> {
    let rules = rows
        .into_iter()
        .map(row_to_rule)
        .collect::<Result<Vec<_>, DatabaseError>>()?;
    Ok(rules)
}

impl DomainPort for PostgresCommissionRuleAdapter {}

#[async_trait]
impl HealthCheckable for PostgresCommissionRuleAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-commission-rule-adapter").await
    }
}

#[async_trait]
impl CommissionRulePort for PostgresCommissionRuleAdapter {
    #[instrument(skip(self), fields(plan_id = %key.plan_id, tier = key.tier_level))]
    async fn rules_for_key(&self, key: &RuleKey) -> Result<Vec<CommissionRule>, PortError> {
        debug!("Loading rule candidates");
        let rows = self
            .repository
            .find_by_key(key.plan_id.as_str(), i16::from(key.tier_level), key.frequency.as_str())
            .await?;
        to_rules(rows)
    }

    #[instrument(skip(self), fields(plan_id = %plan_id))]
    async fn rules_for_plan(&self, plan_id: &PlanId) -> Result<Vec<CommissionRule>, PortError> {
        let rows = self.repository.find_by_plan(plan_id.as_str()).await?;
        to_rules(rows)
    }

    #[instrument(skip(self), fields(rule_id = %id))]
    async fn get_rule(&self, id: CommissionRuleId) -> Result<CommissionRule, PortError> {
        let row = self.repository.get(*id.as_uuid()).await?;
        Ok(row_to_rule(row)?)
    }

    #[instrument(skip(self, rules), fields(count = rules.len()))]
    async fn save_rules(&self, rules: &[CommissionRule]) -> Result<(), PortError> {
        debug!("Saving rules");
        let rows: Vec<_> = rules.iter().map(rule_to_row).collect();
        self.repository.save_all(&rows).await?;
        Ok(())
    }
}
