//! Test Utilities Crate
//!
//! Shared test infrastructure for the agent commission workspace.
//!
//! # Modules
//!
//! - `fixtures`: fixed instants, MYR amounts, a small referral chain and rules
//! - `builders`: agent tree and payment event builders
//! - `database`: PostgreSQL test containers with the commission schema applied
//! - `assertions`: money and ledger-chain assertions
//! - `generators`: property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
