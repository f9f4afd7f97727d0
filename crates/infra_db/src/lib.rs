//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the commission system, built on SQLx.
//!
//! # Architecture
//!
//! - [`repositories`]: row types and SQL, one module per table group
//! - [`adapters`]: implementations of the domain ports on top of the
//!   repositories, converting rows to domain types
//!
//! The settlement adapter opens one database transaction per unit of work
//! and hands it to the engine and the ledger through
//! `domain_settlement::SettlementTx`, so wallet rows are locked with
//! `SELECT ... FOR UPDATE` for the duration of a posting.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig};
//! use infra_db::adapters::PostgresSettlementStore;
//!
//! let config = DatabaseConfig::new("postgres://localhost/commission");
//! let pool = create_pool(&config).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresSettlementStore::new(pool, config.lock_timeout);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::{PostgresAgentAdapter, PostgresCommissionRuleAdapter, PostgresSettlementStore};
