//! Commission calculation engine
//!
//! Turns a completed payment into pending line items for the enrolling
//! agent's upline. The engine writes only through the caller's
//! [`CommissionTx`], so a failed calculation leaves nothing behind once the
//! caller rolls back.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use core_kernel::{Clock, Money};
use domain_agent::{HierarchyResolver, DEFAULT_MAX_DEPTH};

use crate::error::CommissionError;
use crate::line_item::CommissionLineItem;
use crate::payment::CompletedPayment;
use crate::ports::CommissionTx;
use crate::rule_table::RuleTable;

/// Outcome of a calculation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionCalculation {
    pub line_items: Vec<CommissionLineItem>,
    pub total_amount: Money,
    /// True when the line items were already recorded by an earlier run
    pub reused: bool,
}

/// Computes multi-level commissions for payments
#[derive(Clone)]
pub struct CommissionEngine {
    resolver: HierarchyResolver,
    rules: RuleTable,
    max_depth: u8,
}

impl CommissionEngine {
    pub fn new(resolver: HierarchyResolver, rules: RuleTable) -> Self {
        Self {
            resolver,
            rules,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Overrides how many upline levels are paid
    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Calculates the commission line items for a payment
    ///
    /// This method:
    /// 1. Returns the existing line items if the payment was already calculated
    /// 2. Resolves the enrolling agent's upline
    /// 3. Looks up the rule for each level as of the payment's completion time
    /// 4. Inserts one pending line item per paying level in a single batch
    ///
    /// Levels without a rule, held by a non-active agent, or computing to zero
    /// produce no line item.
    ///
    /// # Errors
    ///
    /// - `InvalidPayment` if the basis amount is not positive
    /// - `Agent` if the upline cannot be resolved (cycle, missing agent)
    /// - `Port` on persistence failure; the caller's transaction must be
    ///   rolled back
    #[instrument(
        skip(self, tx, payment, clock),
        fields(payment_id = %payment.payment_id, agent = %payment.agent_code)
    )]
    pub async fn calculate_for_payment<T>(
        &self,
        tx: &mut T,
        payment: &CompletedPayment,
        clock: &dyn Clock,
    ) -> Result<CommissionCalculation, CommissionError>
    where
        T: CommissionTx + ?Sized,
    {
        payment.validate()?;
        let currency = payment.basis.currency();

        let existing = tx.line_items_for_payment(payment.payment_id).await?;
        if !existing.is_empty() {
            let total_amount = Money::sum(currency, existing.iter().map(|i| &i.amount))?;
            debug!(items = existing.len(), "Payment already calculated, reusing line items");
            return Ok(CommissionCalculation {
                line_items: existing,
                total_amount,
                reused: true,
            });
        }

        let upline = self
            .resolver
            .resolve_upline(&payment.agent_code, self.max_depth)
            .await?;

        let now = clock.now();
        let mut line_items = Vec::with_capacity(upline.len());
        for entry in upline {
            if entry.status != domain_agent::AgentStatus::Active {
                debug!(level = entry.level, agent = %entry.agent_code, status = entry.status.as_str(), "Upline agent not active, level skipped");
                continue;
            }

            let Some(rule) = self
                .rules
                .lookup(&payment.plan_id, entry.level, payment.frequency, payment.completed_at)
                .await?
            else {
                debug!(level = entry.level, plan = %payment.plan_id, "No commission rule for level");
                continue;
            };

            let amount = rule.compute(&payment.basis)?;
            if !amount.is_positive() {
                debug!(level = entry.level, rule_id = %rule.id, "Rule computes to zero, level skipped");
                continue;
            }

            line_items.push(CommissionLineItem::pending(
                payment.payment_id,
                entry.agent_code,
                entry.level,
                payment.basis,
                amount,
                rule.id,
                now,
            ));
        }

        if !line_items.is_empty() {
            tx.insert_line_items(&line_items).await?;
        }

        let total_amount = Money::sum(currency, line_items.iter().map(|i| &i.amount))?;
        info!(items = line_items.len(), total = %total_amount, "Commission calculated");

        Ok(CommissionCalculation {
            line_items,
            total_amount,
            reused: false,
        })
    }
}
