//! Request handlers, one module per resource

pub mod agents;
pub mod events;
pub mod health;
pub mod rules;
pub mod runs;
pub mod withdrawals;
