//! Settlement Domain
//!
//! Turns completed payments into posted wallet credits and settles approved
//! withdrawals.
//!
//! # Flow
//!
//! ```text
//! PaymentCompleted ──► SettlementService ──► JobQueue ──► WorkerPool
//!                            │                                 │
//!                       CommissionRun                     Orchestrator
//!                        (queued)                     ┌────────┴────────┐
//!                                               CommissionEngine   WalletLedger
//! ```
//!
//! Every write goes through a [`SettlementTx`] so a line item and its wallet
//! credit commit together. [`InMemorySettlementStore`] implements all ports
//! without a database.

pub mod config;
pub mod error;
pub mod events;
pub mod memory;
pub mod orchestrator;
pub mod ports;
pub mod queries;
pub mod queue;
pub mod retry;
pub mod run;
pub mod service;

pub use config::{SettlementConfig, DEFAULT_PROCESSING_LEASE_SECS};
pub use error::SettlementError;
pub use events::{PaymentCompleted, WithdrawalApproved};
pub use memory::{InMemorySettlementStore, InMemoryTx};
pub use orchestrator::{
    BatchReport, Orchestrator, PostingSummary, RunOutcome, WithdrawalOutcome, LEASE_EXPIRED_ERROR,
};
pub use ports::{RunStore, SettlementStore, SettlementTx};
pub use queries::SettlementQueries;
pub use queue::{Job, JobQueue, WithdrawalReply, WorkerPool};
pub use retry::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAYS_MS};
pub use run::{CommissionRun, RunState};
pub use service::SettlementService;
