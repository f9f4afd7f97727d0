//! Agent registration DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use domain_agent::{Agent, AgentStatus};

/// Creates or replaces an agent record
#[derive(Debug, Deserialize, Validate)]
pub struct AgentRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub referrer_code: Option<String>,
    pub status: Option<AgentStatus>,
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentResponse {
    pub code: String,
    pub name: String,
    pub referrer_code: Option<String>,
    pub status: AgentStatus,
    pub joined_at: DateTime<Utc>,
}

impl From<Agent> for AgentResponse {
    fn from(agent: Agent) -> Self {
        Self {
            code: agent.code.to_string(),
            name: agent.name,
            referrer_code: agent.referrer.map(|r| r.to_string()),
            status: agent.status,
            joined_at: agent.joined_at,
        }
    }
}
