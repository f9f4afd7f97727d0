//! Request and response bodies
//!
//! Amounts cross the wire as integer minor units next to a currency code,
//! never as floats.

pub mod agents;
pub mod events;
pub mod rules;
pub mod runs;
pub mod wallet;
