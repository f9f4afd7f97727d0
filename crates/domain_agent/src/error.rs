//! Agent domain errors

use thiserror::Error;

use core_kernel::{AgentCode, PortError};

/// Errors that can occur in the agent domain
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent the walk started from does not exist
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentCode),

    /// An agent points at a referrer code that has no agent record
    #[error("Agent {agent} references missing referrer {referrer}")]
    MissingReferrer {
        agent: AgentCode,
        referrer: AgentCode,
    },

    /// The referrer chain loops back onto an agent already visited
    #[error("Referrer cycle detected at {repeated} while resolving upline of {start}")]
    CycleDetected {
        start: AgentCode,
        repeated: AgentCode,
        chain: Vec<AgentCode>,
    },

    /// An agent cannot refer itself
    #[error("Agent {0} cannot be its own referrer")]
    SelfReferral(AgentCode),

    /// Backing store failure
    #[error("Agent store error: {0}")]
    Port(#[from] PortError),
}

impl AgentError {
    /// Returns true for corrupted hierarchy data (cycles, dangling references,
    /// unknown agents) that operators must repair by hand
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            AgentError::AgentNotFound(_)
                | AgentError::MissingReferrer { .. }
                | AgentError::CycleDetected { .. }
        )
    }

    /// Returns true if retrying the operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Port(e) if e.is_transient())
    }
}
