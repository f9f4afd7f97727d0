//! Insurance agent records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::AgentCode;

/// Agent status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
    Suspended,
    Terminated,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
            AgentStatus::Suspended => "suspended",
            AgentStatus::Terminated => "terminated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AgentStatus::Active),
            "inactive" => Some(AgentStatus::Inactive),
            "suspended" => Some(AgentStatus::Suspended),
            "terminated" => Some(AgentStatus::Terminated),
            _ => None,
        }
    }
}

/// An insurance agent in the referral hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub code: AgentCode,
    pub name: String,
    /// Upline referrer; `None` at the top of the hierarchy
    pub referrer: Option<AgentCode>,
    pub status: AgentStatus,
    pub joined_at: DateTime<Utc>,
}

impl Agent {
    /// Creates a new active agent without a referrer
    pub fn new(code: AgentCode, name: impl Into<String>, joined_at: DateTime<Utc>) -> Self {
        Self {
            code,
            name: name.into(),
            referrer: None,
            status: AgentStatus::Active,
            joined_at,
        }
    }

    /// Sets the upline referrer
    pub fn with_referrer(mut self, referrer: AgentCode) -> Self {
        self.referrer = Some(referrer);
        self
    }

    /// Sets the status
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Only active agents earn commission
    pub fn can_earn_commission(&self) -> bool {
        self.status == AgentStatus::Active
    }

    /// Returns true at the top of the hierarchy
    pub fn is_root(&self) -> bool {
        self.referrer.is_none()
    }
}
