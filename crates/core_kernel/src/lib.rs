//! Core Kernel - Foundational types for the agent commission system
//!
//! This crate provides the building blocks shared by every domain crate:
//! - Money held as integer minor units, with percentage rates that round half-up
//! - Strongly-typed identifiers and business codes (agent codes, plan ids)
//! - Effective periods, the business timezone and an injectable clock
//! - Port abstractions used by the hexagonal adapters

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{Money, Currency, MoneyError, Rate};
pub use temporal::{ValidPeriod, Timezone, TemporalError, Clock, SystemClock, FixedClock};
pub use identifiers::{
    PaymentId, PolicyId, LineItemId, WalletTransactionId, WithdrawalId,
    CommissionRuleId, CommissionRunId, AgentCode, PlanId,
};
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
pub use error::CoreError;
