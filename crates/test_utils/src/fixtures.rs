//! Pre-built Test Fixtures
//!
//! Consistent, predictable data for unit tests: fixed instants, MYR amounts,
//! plan codes and a small referral chain.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use rust_decimal_macros::dec;

use core_kernel::{AgentCode, Currency, Money, PlanId, Rate, ValidPeriod};
use domain_agent::Agent;
use domain_commission::{CommissionRule, PaymentFrequency};

static EPOCH: Lazy<DateTime<Utc>> = Lazy::new(|| {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
});

/// Fixture for instants
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// 2024-01-01T00:00:00Z, the start of every fixture rule
    pub fn epoch() -> DateTime<Utc> {
        *EPOCH
    }

    /// Mid-February 2024, inside the February batch in Kuala Lumpur time
    pub fn mid_february() -> DateTime<Utc> {
        *EPOCH + chrono::Duration::days(45)
    }

    /// Open-ended period starting at the epoch
    pub fn from_epoch() -> ValidPeriod {
        ValidPeriod::from(Self::epoch())
    }
}

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn myr(minor: i64) -> Money {
        Money::from_minor(minor, Currency::MYR)
    }

    /// RM 1,000.00
    pub fn myr_1000() -> Money {
        Self::myr(100_000)
    }

    pub fn myr_zero() -> Money {
        Money::zero(Currency::MYR)
    }

    /// An amount for currency mismatch tests
    pub fn sgd_100() -> Money {
        Money::from_minor(10_000, Currency::SGD)
    }
}

/// Fixture for codes
pub struct CodeFixtures;

impl CodeFixtures {
    pub fn plan() -> PlanId {
        PlanId::new("LIFE01")
    }

    pub fn agent(code: &str) -> AgentCode {
        AgentCode::new(code)
    }
}

/// Fixture for agent hierarchies
pub struct AgentFixtures;

impl AgentFixtures {
    /// A -> B -> C, where A enrolls members and C is the root
    pub fn abc_chain() -> Vec<Agent> {
        let at = TemporalFixtures::epoch();
        vec![
            Agent::new(AgentCode::new("A"), "Agent A", at).with_referrer(AgentCode::new("B")),
            Agent::new(AgentCode::new("B"), "Agent B", at).with_referrer(AgentCode::new("C")),
            Agent::new(AgentCode::new("C"), "Agent C", at),
        ]
    }

    /// X -> Y -> X
    pub fn two_cycle() -> Vec<Agent> {
        let at = TemporalFixtures::epoch();
        vec![
            Agent::new(AgentCode::new("X"), "Agent X", at).with_referrer(AgentCode::new("Y")),
            Agent::new(AgentCode::new("Y"), "Agent Y", at).with_referrer(AgentCode::new("X")),
        ]
    }
}

/// Fixture for commission rules
pub struct RuleFixtures;

impl RuleFixtures {
    /// A monthly percentage rule on the fixture plan, effective from the epoch
    pub fn monthly_percentage(tier: u8, percentage: rust_decimal::Decimal) -> CommissionRule {
        CommissionRule::percentage(
            CodeFixtures::plan(),
            tier,
            PaymentFrequency::Monthly,
            Rate::from_percentage(percentage).expect("fixture percentage within 0..=100"),
            TemporalFixtures::from_epoch(),
            TemporalFixtures::epoch(),
        )
        .expect("valid fixture rule")
    }

    /// Tier 1 pays 10%, tier 2 pays 5%
    pub fn two_tier() -> Vec<CommissionRule> {
        vec![
            Self::monthly_percentage(1, dec!(10)),
            Self::monthly_percentage(2, dec!(5)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abc_chain_has_one_root() {
        let chain = AgentFixtures::abc_chain();
        assert_eq!(chain.iter().filter(|a| a.is_root()).count(), 1);
    }

    #[test]
    fn test_two_tier_rules() {
        let rules = RuleFixtures::two_tier();
        assert_eq!(rules[0].tier_level, 1);
        assert_eq!(rules[1].tier_level, 2);
        assert!(rules.iter().all(|r| r.applies_at(TemporalFixtures::mid_february())));
    }
}
