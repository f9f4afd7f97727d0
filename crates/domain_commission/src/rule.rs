//! Commission rules
//!
//! A rule is keyed by (plan, tier level, payment frequency) and pays either a
//! percentage of the payment basis or a fixed amount. Rules are
//! effective-dated and can be switched off without being deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{CommissionRuleId, Money, PlanId, Rate, ValidPeriod};

use crate::error::CommissionError;

/// Deepest tier that can carry a rule
pub const MAX_TIER_LEVEL: u8 = 5;

/// How often the policy premium is collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFrequency {
    Single,
    Annual,
    SemiAnnual,
    Quarterly,
    Monthly,
}

impl PaymentFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentFrequency::Single => "single",
            PaymentFrequency::Annual => "annual",
            PaymentFrequency::SemiAnnual => "semi_annual",
            PaymentFrequency::Quarterly => "quarterly",
            PaymentFrequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for PaymentFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentFrequency {
    type Err = CommissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(PaymentFrequency::Single),
            "annual" | "yearly" => Ok(PaymentFrequency::Annual),
            "semi_annual" => Ok(PaymentFrequency::SemiAnnual),
            "quarterly" => Ok(PaymentFrequency::Quarterly),
            "monthly" => Ok(PaymentFrequency::Monthly),
            other => Err(CommissionError::InvalidRule(format!(
                "unknown payment frequency '{}'",
                other
            ))),
        }
    }
}

/// What a rule pays out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RuleBasis {
    /// Percentage of the payment basis, rounded half-up to the minor unit
    Percentage(Rate),
    /// Flat amount regardless of the basis
    Fixed(Money),
}

/// Lookup key of a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub plan_id: PlanId,
    pub tier_level: u8,
    pub frequency: PaymentFrequency,
}

/// A tiered commission rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRule {
    pub id: CommissionRuleId,
    pub plan_id: PlanId,
    /// 1 pays the enrolling agent's direct referrer
    pub tier_level: u8,
    pub frequency: PaymentFrequency,
    pub basis: RuleBasis,
    pub active: bool,
    pub effective: ValidPeriod,
    pub created_at: DateTime<Utc>,
}

impl CommissionRule {
    /// Creates an active rule after validating the tier and amount
    pub fn new(
        plan_id: PlanId,
        tier_level: u8,
        frequency: PaymentFrequency,
        basis: RuleBasis,
        effective: ValidPeriod,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CommissionError> {
        let rule = Self {
            id: CommissionRuleId::new_v7(),
            plan_id,
            tier_level,
            frequency,
            basis,
            active: true,
            effective,
            created_at,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Convenience constructor for a percentage rule
    pub fn percentage(
        plan_id: PlanId,
        tier_level: u8,
        frequency: PaymentFrequency,
        rate: Rate,
        effective: ValidPeriod,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CommissionError> {
        Self::new(plan_id, tier_level, frequency, RuleBasis::Percentage(rate), effective, created_at)
    }

    /// Convenience constructor for a fixed-amount rule
    pub fn fixed(
        plan_id: PlanId,
        tier_level: u8,
        frequency: PaymentFrequency,
        amount: Money,
        effective: ValidPeriod,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CommissionError> {
        Self::new(plan_id, tier_level, frequency, RuleBasis::Fixed(amount), effective, created_at)
    }

    /// Checks the structural invariants of the rule
    pub fn validate(&self) -> Result<(), CommissionError> {
        if self.tier_level == 0 || self.tier_level > MAX_TIER_LEVEL {
            return Err(CommissionError::InvalidRule(format!(
                "tier level {} is outside 1..={}",
                self.tier_level, MAX_TIER_LEVEL
            )));
        }
        if let RuleBasis::Fixed(amount) = self.basis {
            if amount.is_negative() {
                return Err(CommissionError::InvalidRule(format!(
                    "fixed amount {} is negative",
                    amount
                )));
            }
        }
        if let Some(end) = self.effective.end {
            if end <= self.effective.start {
                return Err(CommissionError::InvalidRule(
                    "effective period must end after it starts".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn key(&self) -> RuleKey {
        RuleKey {
            plan_id: self.plan_id.clone(),
            tier_level: self.tier_level,
            frequency: self.frequency,
        }
    }

    pub fn matches(&self, key: &RuleKey) -> bool {
        self.plan_id == key.plan_id
            && self.tier_level == key.tier_level
            && self.frequency == key.frequency
    }

    /// Returns true if the rule is active and effective at `as_of`
    pub fn applies_at(&self, as_of: DateTime<Utc>) -> bool {
        self.active && self.effective.contains(as_of)
    }

    /// Returns true if both rules are active for the same key over an
    /// overlapping period
    pub fn conflicts_with(&self, other: &CommissionRule) -> bool {
        self.id != other.id
            && self.active
            && other.active
            && self.matches(&other.key())
            && self.effective.overlaps(&other.effective)
    }

    /// Computes the commission this rule pays on `basis`
    pub fn compute(&self, basis: &Money) -> Result<Money, CommissionError> {
        match self.basis {
            RuleBasis::Percentage(rate) => Ok(rate.apply(basis)?),
            RuleBasis::Fixed(amount) => {
                if amount.currency() != basis.currency() {
                    return Err(core_kernel::MoneyError::CurrencyMismatch(
                        amount.currency().to_string(),
                        basis.currency().to_string(),
                    )
                    .into());
                }
                Ok(amount)
            }
        }
    }
}
