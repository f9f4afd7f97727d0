//! Property-Based Test Generators
//!
//! Proptest strategies that stay inside the domain's invariants: positive
//! bases, percentages within 0..=100, tiers within 1..=5.

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::{Currency, Money, Rate};

use crate::fixtures::TemporalFixtures;

/// Strategy for payment bases in minor units, up to RM 1,000,000.00
pub fn basis_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..100_000_000i64
}

pub fn myr_money_strategy() -> impl Strategy<Value = Money> {
    basis_minor_strategy().prop_map(|minor| Money::from_minor(minor, Currency::MYR))
}

/// Percentages with four decimal places in 0..=100
pub fn percentage_strategy() -> impl Strategy<Value = Decimal> {
    (0u32..=1_000_000u32).prop_map(|n| Decimal::new(i64::from(n), 4))
}

pub fn rate_strategy() -> impl Strategy<Value = Rate> {
    percentage_strategy().prop_filter_map("rate within range", |p| Rate::from_percentage(p).ok())
}

pub fn tier_strategy() -> impl Strategy<Value = u8> {
    1u8..=5u8
}

/// Length of a referral chain including the enrolling agent
pub fn chain_length_strategy() -> impl Strategy<Value = usize> {
    1usize..=8usize
}

/// Chain of distinct agent codes `AG0`, `AG1`, ...
pub fn agent_chain_strategy() -> impl Strategy<Value = Vec<String>> {
    chain_length_strategy().prop_map(|n| (0..n).map(|i| format!("AG{i}")).collect())
}

/// Instants within 2024, after the fixture rules start
pub fn instant_2024_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..365 * 24 * 60).prop_map(|minutes| TemporalFixtures::epoch() + Duration::minutes(minutes))
}

/// Signed ledger amounts, never zero
pub fn signed_amount_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![1i64..1_000_000i64, -1_000_000i64..-1i64]
}
