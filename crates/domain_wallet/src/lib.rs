//! Wallet Domain - Append-only Agent Ledger
//!
//! Each agent owns one wallet. Its balance is the sum of an append-only log
//! of signed entries; a cached balance is kept alongside and updated in the
//! same transaction as every append.
//!
//! # Entry kinds
//!
//! - **Credit**: a posted commission line item
//! - **Debit**: a paid withdrawal request
//! - **Adjustment**: manual corrections and commission reversals
//!
//! # Example
//!
//! ```rust,ignore
//! let ledger = WalletLedger::new(Currency::MYR);
//! let entry = ledger
//!     .post_credit(&mut tx, &agent, amount, SourceRef::line_item(item.id), &clock)
//!     .await?;
//! assert_eq!(entry.balance_after, previous_balance.checked_add(&amount)?);
//! ```

pub mod wallet;
pub mod transaction;
pub mod withdrawal;
pub mod ledger;
pub mod ports;
pub mod error;

pub use wallet::{Wallet, WalletSummary, Reconciliation};
pub use transaction::{WalletTransaction, TransactionKind, SourceRef};
pub use withdrawal::{WithdrawalRequest, WithdrawalStatus};
pub use ledger::WalletLedger;
pub use ports::{LedgerTx, LedgerTotals, WalletReadPort};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::MockLedgerTx;
pub use error::WalletError;
