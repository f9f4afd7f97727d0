//! The commission rule table
//!
//! Maps (plan, tier level, payment frequency) to the rule in force at a given
//! instant and guards the "one active rule per key at any time" invariant on
//! every write.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use core_kernel::{CommissionRuleId, Currency, PlanId};

use crate::error::CommissionError;
use crate::ports::CommissionRulePort;
use crate::rule::{CommissionRule, PaymentFrequency, RuleBasis, RuleKey};

/// Which rule wins when several active rules match the same instant
///
/// Writes through [`RuleTable`] never leave overlapping active rules, so this
/// only matters for data loaded from elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSelection {
    /// Most recently created rule wins
    #[default]
    LatestCreated,
    /// Earliest created rule wins
    EarliestCreated,
}

/// Picks the rule in force at `as_of` among `candidates`
///
/// Only active rules whose effective period contains `as_of` are considered.
/// Ties on creation time are broken by rule id so the result is stable.
pub fn select_rule<'a>(
    candidates: &'a [CommissionRule],
    as_of: DateTime<Utc>,
    selection: RuleSelection,
) -> Option<&'a CommissionRule> {
    let by_recency = |a: &&CommissionRule, b: &&CommissionRule| -> Ordering {
        a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
    };

    let applicable = candidates.iter().filter(|r| r.applies_at(as_of));
    match selection {
        RuleSelection::LatestCreated => applicable.max_by(by_recency),
        RuleSelection::EarliestCreated => applicable.min_by(by_recency),
    }
}

/// Returns the first stored rule that would overlap `candidate` while both are active
pub fn find_conflict<'a>(
    existing: &'a [CommissionRule],
    candidate: &CommissionRule,
) -> Option<&'a CommissionRule> {
    existing.iter().find(|r| r.conflicts_with(candidate))
}

/// Rule table service over a [`CommissionRulePort`]
///
/// Fixed-amount rules must be denominated in the ledger `currency`, or every
/// payment they matched would fail at posting time.
#[derive(Clone)]
pub struct RuleTable {
    port: Arc<dyn CommissionRulePort>,
    currency: Currency,
    selection: RuleSelection,
}

impl RuleTable {
    pub fn new(port: Arc<dyn CommissionRulePort>, currency: Currency) -> Self {
        Self {
            port,
            currency,
            selection: RuleSelection::default(),
        }
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn with_selection(mut self, selection: RuleSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Finds the rule in force for (plan, tier, frequency) at `as_of`
    ///
    /// `None` means no commission is paid at this tier.
    pub async fn lookup(
        &self,
        plan_id: &PlanId,
        tier_level: u8,
        frequency: PaymentFrequency,
        as_of: DateTime<Utc>,
    ) -> Result<Option<CommissionRule>, CommissionError> {
        let key = RuleKey {
            plan_id: plan_id.clone(),
            tier_level,
            frequency,
        };
        let candidates = self.port.rules_for_key(&key).await?;
        Ok(select_rule(&candidates, as_of, self.selection).cloned())
    }

    /// Adds a new rule
    ///
    /// # Errors
    ///
    /// - `InvalidRule` if the rule fails validation or pays a fixed amount in
    ///   another currency than the ledger
    /// - `RuleConflict` if it is active and overlaps another active rule
    #[instrument(skip(self, rule), fields(rule_id = %rule.id, plan = %rule.plan_id, tier = rule.tier_level))]
    pub async fn insert(&self, rule: CommissionRule) -> Result<CommissionRule, CommissionError> {
        self.check(&rule)?;
        let existing = self.port.rules_for_key(&rule.key()).await?;
        if let Some(conflict) = find_conflict(&existing, &rule) {
            return Err(CommissionError::RuleConflict {
                existing: conflict.id,
                candidate: rule.id,
            });
        }

        self.port.save_rules(std::slice::from_ref(&rule)).await?;
        info!("Commission rule inserted");
        Ok(rule)
    }

    /// Re-enables a rule, subject to the same overlap check as insert
    pub async fn activate(&self, id: CommissionRuleId) -> Result<CommissionRule, CommissionError> {
        let mut rule = self.get(id).await?;
        if rule.active {
            return Ok(rule);
        }

        rule.active = true;
        self.check(&rule)?;
        let existing = self.port.rules_for_key(&rule.key()).await?;
        if let Some(conflict) = find_conflict(&existing, &rule) {
            return Err(CommissionError::RuleConflict {
                existing: conflict.id,
                candidate: rule.id,
            });
        }

        self.port.save_rules(std::slice::from_ref(&rule)).await?;
        info!(rule_id = %id, "Commission rule activated");
        Ok(rule)
    }

    pub async fn deactivate(&self, id: CommissionRuleId) -> Result<CommissionRule, CommissionError> {
        let mut rule = self.get(id).await?;
        if !rule.active {
            return Ok(rule);
        }

        rule.active = false;
        self.port.save_rules(std::slice::from_ref(&rule)).await?;
        info!(rule_id = %id, "Commission rule deactivated");
        Ok(rule)
    }

    /// Installs an effective-dated override
    ///
    /// Every active rule of the same key that overlaps the override is closed
    /// at the override's start. A rule that starts on or after that instant
    /// cannot be closed there and is deactivated instead. The override and
    /// the closed rules are saved as one batch.
    ///
    /// # Returns
    ///
    /// The ids of the rules that were closed or deactivated
    #[instrument(skip(self, rule), fields(rule_id = %rule.id, plan = %rule.plan_id, tier = rule.tier_level))]
    pub async fn supersede(
        &self,
        rule: CommissionRule,
    ) -> Result<Vec<CommissionRuleId>, CommissionError> {
        self.check(&rule)?;
        let override_start = rule.effective.start;

        let mut batch = Vec::new();
        for mut prior in self.port.rules_for_key(&rule.key()).await? {
            if !prior.conflicts_with(&rule) {
                continue;
            }
            if prior.effective.start < override_start {
                prior.effective.close_at(override_start)?;
            } else {
                prior.active = false;
            }
            debug!(superseded = %prior.id, "Closing overlapped rule");
            batch.push(prior);
        }

        let superseded: Vec<_> = batch.iter().map(|r| r.id).collect();
        batch.push(rule);
        self.port.save_rules(&batch).await?;

        info!(superseded = superseded.len(), "Commission rule override installed");
        Ok(superseded)
    }

    pub async fn rules_for_plan(
        &self,
        plan_id: &PlanId,
    ) -> Result<Vec<CommissionRule>, CommissionError> {
        Ok(self.port.rules_for_plan(plan_id).await?)
    }

    fn check(&self, rule: &CommissionRule) -> Result<(), CommissionError> {
        rule.validate()?;
        if let RuleBasis::Fixed(amount) = &rule.basis {
            if amount.currency() != self.currency {
                return Err(CommissionError::InvalidRule(format!(
                    "fixed amount is in {:?} but the ledger settles in {:?}",
                    amount.currency(),
                    self.currency
                )));
            }
        }
        Ok(())
    }

    async fn get(&self, id: CommissionRuleId) -> Result<CommissionRule, CommissionError> {
        match self.port.get_rule(id).await {
            Ok(rule) => Ok(rule),
            Err(e) if e.is_not_found() => Err(CommissionError::RuleNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use core_kernel::{Rate, ValidPeriod};
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn rule_created(pct: rust_decimal::Decimal, created_at: DateTime<Utc>) -> CommissionRule {
        CommissionRule::percentage(
            PlanId::new("LIFE01"),
            1,
            PaymentFrequency::Monthly,
            Rate::from_percentage(pct).unwrap(),
            ValidPeriod::from(t0()),
            created_at,
        )
        .unwrap()
    }

    #[test]
    fn test_latest_created_wins() {
        let older = rule_created(dec!(10), t0());
        let newer = rule_created(dec!(12), t0() + Duration::days(1));
        let candidates = vec![older.clone(), newer.clone()];

        let picked = select_rule(&candidates, t0() + Duration::days(3), RuleSelection::LatestCreated);
        assert_eq!(picked.map(|r| r.id), Some(newer.id));

        let picked = select_rule(&candidates, t0() + Duration::days(3), RuleSelection::EarliestCreated);
        assert_eq!(picked.map(|r| r.id), Some(older.id));
    }

    #[test]
    fn test_creation_tie_broken_by_id() {
        let a = rule_created(dec!(10), t0());
        let b = rule_created(dec!(11), t0());
        let expected = if a.id > b.id { a.id } else { b.id };

        let candidates = vec![a, b];
        let picked = select_rule(&candidates, t0(), RuleSelection::LatestCreated);
        assert_eq!(picked.map(|r| r.id), Some(expected));
    }

    #[test]
    fn test_inactive_and_out_of_period_rules_ignored() {
        let mut inactive = rule_created(dec!(10), t0());
        inactive.active = false;
        let candidates = vec![inactive];

        assert!(select_rule(&candidates, t0(), RuleSelection::LatestCreated).is_none());
        assert!(select_rule(&[], t0(), RuleSelection::LatestCreated).is_none());

        let future = rule_created(dec!(10), t0());
        let before_start = t0() - Duration::seconds(1);
        assert!(select_rule(&[future], before_start, RuleSelection::LatestCreated).is_none());
    }
}
