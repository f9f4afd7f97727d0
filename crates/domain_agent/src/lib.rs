//! Agent Domain
//!
//! Agents enroll members and earn multi-level commissions. Each agent has at
//! most one upline referrer; the referrer links form a forest that must stay
//! acyclic.
//!
//! # Hierarchy
//!
//! ```text
//!        C            level 2 for A
//!        │
//!        B            level 1 for A (direct referrer)
//!        │
//!        A            enrolling agent
//! ```
//!
//! The [`HierarchyResolver`] walks this chain upwards through the
//! [`AgentPort`], stopping at the configured depth or at the top of the
//! hierarchy, and refuses to loop on corrupted (cyclic) data.

pub mod agent;
pub mod hierarchy;
pub mod ports;
pub mod error;

pub use agent::{Agent, AgentStatus};
pub use hierarchy::{HierarchyResolver, UplineEntry, DEFAULT_MAX_DEPTH};
pub use ports::AgentPort;
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::MockAgentPort;
pub use error::AgentError;
