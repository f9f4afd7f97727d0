//! Commission Domain Ports
//!
//! - [`CommissionRulePort`]: persistence of the rule table
//! - [`CommissionTx`]: line-item access inside a caller-owned transaction
//! - [`CommissionHistoryPort`]: read side for agent-facing history
//! - [`PaymentSource`]: completed payments received from upstream
//!
//! Adapters live in `infra_db` (Postgres) and `domain_settlement` (in-memory
//! unit of work); the `mock` module carries lightweight test doubles.

use async_trait::async_trait;

use core_kernel::{
    AgentCode, CommissionRuleId, DomainPort, HealthCheckable, LineItemId, PaymentId, PlanId,
    PortError, ValidPeriod,
};

use crate::line_item::CommissionLineItem;
use crate::payment::CompletedPayment;
use crate::rule::{CommissionRule, RuleKey};

/// Persistence port for commission rules
///
/// Adapters only filter by key; selection among candidates is done by
/// [`crate::rule_table::select_rule`] so every backend shares one policy.
#[async_trait]
pub trait CommissionRulePort: DomainPort + HealthCheckable {
    /// All rules (active or not) stored under `key`
    async fn rules_for_key(&self, key: &RuleKey) -> Result<Vec<CommissionRule>, PortError>;

    /// All rules of a plan, ordered by tier then creation time
    async fn rules_for_plan(&self, plan_id: &PlanId) -> Result<Vec<CommissionRule>, PortError>;

    /// Retrieves a rule by id
    async fn get_rule(&self, id: CommissionRuleId) -> Result<CommissionRule, PortError>;

    /// Upserts a batch of rules atomically
    async fn save_rules(&self, rules: &[CommissionRule]) -> Result<(), PortError>;
}

/// Line-item operations scoped to an open transaction
///
/// Implemented by transaction handles, so every call here commits or rolls
/// back together with the caller's other writes.
#[async_trait]
pub trait CommissionTx: Send {
    /// Line items already recorded for a payment, ordered by level
    async fn line_items_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<Vec<CommissionLineItem>, PortError>;

    /// Inserts line items as one batch
    ///
    /// Fails with `PortError::Conflict` if any (payment, level) already exists.
    async fn insert_line_items(&mut self, items: &[CommissionLineItem]) -> Result<(), PortError>;

    /// Reads a line item, locking it until the transaction ends
    async fn lock_line_item(&mut self, id: LineItemId) -> Result<CommissionLineItem, PortError>;

    /// Persists status changes of a line item
    async fn update_line_item(&mut self, item: &CommissionLineItem) -> Result<(), PortError>;
}

/// Read side over committed line items
#[async_trait]
pub trait CommissionHistoryPort: DomainPort {
    /// Line items earned by an agent, newest first
    async fn line_items_for_agent(
        &self,
        agent_code: &AgentCode,
    ) -> Result<Vec<CommissionLineItem>, PortError>;
}

/// Store of completed payments received from the payment subsystem
#[async_trait]
pub trait PaymentSource: DomainPort {
    /// Records a payment; returns false if it was already known
    async fn record_payment(&self, payment: &CompletedPayment) -> Result<bool, PortError>;

    async fn get_payment(&self, payment_id: PaymentId) -> Result<CompletedPayment, PortError>;

    /// Payments whose completion time falls in `period`, oldest first
    async fn payments_completed_in(
        &self,
        period: &ValidPeriod,
    ) -> Result<Vec<CompletedPayment>, PortError>;
}

/// Mock implementations for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use chrono::Utc;
    use tokio::sync::RwLock;

    use core_kernel::{AdapterHealth, HealthCheckResult};

    /// In-memory rule store
    #[derive(Debug, Default)]
    pub struct MockCommissionRulePort {
        rules: Arc<RwLock<HashMap<CommissionRuleId, CommissionRule>>>,
    }

    impl MockCommissionRulePort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates with rules, bypassing conflict checks
        pub async fn with_rules(rules: Vec<CommissionRule>) -> Self {
            let port = Self::new();
            {
                let mut map = port.rules.write().await;
                for rule in rules {
                    map.insert(rule.id, rule);
                }
            }
            port
        }
    }

    impl DomainPort for MockCommissionRulePort {}

    #[async_trait]
    impl HealthCheckable for MockCommissionRulePort {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "mock-commission-rule-port".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: Some("Mock adapter always healthy".to_string()),
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl CommissionRulePort for MockCommissionRulePort {
        async fn rules_for_key(&self, key: &RuleKey) -> Result<Vec<CommissionRule>, PortError> {
            Ok(self
                .rules
                .read()
                .await
                .values()
                .filter(|r| r.matches(key))
                .cloned()
                .collect())
        }

        async fn rules_for_plan(&self, plan_id: &PlanId) -> Result<Vec<CommissionRule>, PortError> {
            let mut rules: Vec<_> = self
                .rules
                .read()
                .await
                .values()
                .filter(|r| &r.plan_id == plan_id)
                .cloned()
                .collect();
            rules.sort_by(|a, b| {
                a.tier_level
                    .cmp(&b.tier_level)
                    .then(a.created_at.cmp(&b.created_at))
            });
            Ok(rules)
        }

        async fn get_rule(&self, id: CommissionRuleId) -> Result<CommissionRule, PortError> {
            self.rules
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("CommissionRule", id))
        }

        async fn save_rules(&self, rules: &[CommissionRule]) -> Result<(), PortError> {
            let mut map = self.rules.write().await;
            for rule in rules {
                map.insert(rule.id, rule.clone());
            }
            Ok(())
        }
    }

    /// Line-item store standing in for an open transaction
    #[derive(Debug, Default)]
    pub struct MockCommissionTx {
        pub items: Vec<CommissionLineItem>,
        /// Number of `insert_line_items` calls that wrote rows
        pub insert_batches: usize,
    }

    impl MockCommissionTx {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl CommissionTx for MockCommissionTx {
        async fn line_items_for_payment(
            &mut self,
            payment_id: PaymentId,
        ) -> Result<Vec<CommissionLineItem>, PortError> {
            let mut items: Vec<_> = self
                .items
                .iter()
                .filter(|i| i.payment_id == payment_id)
                .cloned()
                .collect();
            items.sort_by_key(|i| i.level);
            Ok(items)
        }

        async fn insert_line_items(&mut self, items: &[CommissionLineItem]) -> Result<(), PortError> {
            for item in items {
                if self
                    .items
                    .iter()
                    .any(|i| i.payment_id == item.payment_id && i.level == item.level)
                {
                    return Err(PortError::conflict(format!(
                        "line item for {} level {} already exists",
                        item.payment_id, item.level
                    )));
                }
            }
            self.items.extend_from_slice(items);
            self.insert_batches += 1;
            Ok(())
        }

        async fn lock_line_item(&mut self, id: LineItemId) -> Result<CommissionLineItem, PortError> {
            self.items
                .iter()
                .find(|i| i.id == id)
                .cloned()
                .ok_or_else(|| PortError::not_found("CommissionLineItem", id))
        }

        async fn update_line_item(&mut self, item: &CommissionLineItem) -> Result<(), PortError> {
            let slot = self
                .items
                .iter_mut()
                .find(|i| i.id == item.id)
                .ok_or_else(|| PortError::not_found("CommissionLineItem", item.id))?;
            *slot = item.clone();
            Ok(())
        }
    }
}
