//! Repository implementations
//!
//! Repositories speak in rows; the adapters in [`crate::adapters`] convert
//! them to domain types. Functions taking a `PgConnection` run inside a
//! caller-owned transaction.

pub mod agent;
pub mod commission;
pub mod run;
pub mod wallet;

pub use agent::{AgentRepository, AgentRow};
pub use commission::{CommissionRuleRepository, CommissionRuleRow, LineItemRow, PaymentRepository, PaymentRow};
pub use run::{RunRepository, RunRow};
pub use wallet::{TotalsRow, WalletRepository, WalletRow, WalletTransactionRow, WithdrawalRow};
