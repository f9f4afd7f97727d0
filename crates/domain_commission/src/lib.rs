//! Commission Domain
//!
//! Multi-level commission calculation for insurance premium payments.
//!
//! # Flow
//!
//! ```text
//! CompletedPayment ──► HierarchyResolver ──► upline levels 1..=5
//!                                                │
//!                          RuleTable::lookup ◄───┘  (plan, level, frequency, completed_at)
//!                                │
//!                                ▼
//!                     pending CommissionLineItem per paying level
//! ```
//!
//! The engine is idempotent per payment: a second calculation returns the
//! line items recorded by the first instead of creating new ones.

pub mod rule;
pub mod rule_table;
pub mod payment;
pub mod line_item;
pub mod engine;
pub mod ports;
pub mod error;

pub use rule::{CommissionRule, RuleBasis, RuleKey, PaymentFrequency, MAX_TIER_LEVEL};
pub use rule_table::{RuleTable, RuleSelection, select_rule, find_conflict};
pub use payment::CompletedPayment;
pub use line_item::{CommissionLineItem, LineItemStatus};
pub use engine::{CommissionEngine, CommissionCalculation};
pub use ports::{CommissionRulePort, CommissionTx, CommissionHistoryPort, PaymentSource};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::{MockCommissionRulePort, MockCommissionTx};
pub use error::CommissionError;
