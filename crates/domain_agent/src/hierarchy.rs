//! Upline resolution over the referrer graph

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use core_kernel::AgentCode;

use crate::agent::{Agent, AgentStatus};
use crate::error::AgentError;
use crate::ports::AgentPort;

/// Number of upline levels that earn commission
pub const DEFAULT_MAX_DEPTH: u8 = 5;

/// One agent in a resolved upline chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UplineEntry {
    pub agent_code: AgentCode,
    /// 1 is the direct referrer, 2 the referrer's referrer, and so on
    pub level: u8,
    pub status: AgentStatus,
}

/// Resolves referrer chains through an [`AgentPort`]
///
/// Resolution never writes; every failure mode (unknown agent, dangling
/// referrer, cycle) is reported as a data-integrity [`AgentError`].
#[derive(Clone)]
pub struct HierarchyResolver {
    agents: Arc<dyn AgentPort>,
}

impl HierarchyResolver {
    pub fn new(agents: Arc<dyn AgentPort>) -> Self {
        Self { agents }
    }

    /// Resolves the upline of `agent_code`, up to `max_depth` levels
    ///
    /// # Returns
    ///
    /// The referrers ordered from level 1 upwards. Empty when the agent has
    /// no referrer or `max_depth` is zero.
    ///
    /// # Errors
    ///
    /// - `AgentNotFound` if the starting agent does not exist
    /// - `MissingReferrer` if a referrer code has no agent record
    /// - `CycleDetected` if an agent is reached twice
    #[instrument(skip(self), fields(agent = %agent_code))]
    pub async fn resolve_upline(
        &self,
        agent_code: &AgentCode,
        max_depth: u8,
    ) -> Result<Vec<UplineEntry>, AgentError> {
        let start = self.load_start(agent_code).await?;
        let chain = self.walk(&start, max_depth as usize).await?;

        debug!(levels = chain.len(), "Resolved upline");
        Ok(chain
            .into_iter()
            .zip(1..=max_depth)
            .map(|(agent, level)| UplineEntry {
                agent_code: agent.code,
                level,
                status: agent.status,
            })
            .collect())
    }

    /// Checks that `referrer` may become the referrer of `agent_code`
    ///
    /// The assignment is rejected when it would close a loop, i.e. when the
    /// agent already appears anywhere in the referrer's upline.
    pub async fn validate_referrer(
        &self,
        agent_code: &AgentCode,
        referrer: &AgentCode,
    ) -> Result<(), AgentError> {
        if agent_code == referrer {
            return Err(AgentError::SelfReferral(agent_code.clone()));
        }

        let referrer_agent = self.load_start(referrer).await?;
        let upline = self.walk(&referrer_agent, usize::MAX).await?;

        if upline.iter().any(|a| &a.code == agent_code) {
            let mut chain = vec![referrer.clone()];
            chain.extend(upline.into_iter().map(|a| a.code));
            warn!(agent = %agent_code, referrer = %referrer, "Rejected referrer assignment that would create a cycle");
            return Err(AgentError::CycleDetected {
                start: agent_code.clone(),
                repeated: agent_code.clone(),
                chain,
            });
        }
        Ok(())
    }

    /// Validates and persists a referrer change
    pub async fn assign_referrer(
        &self,
        agent_code: &AgentCode,
        referrer: &AgentCode,
    ) -> Result<Agent, AgentError> {
        self.validate_referrer(agent_code, referrer).await?;

        let mut agent = self.load_start(agent_code).await?;
        agent.referrer = Some(referrer.clone());
        self.agents.save_agent(&agent).await?;
        Ok(agent)
    }

    /// Lists the direct recruits of an agent
    pub async fn downline(&self, agent_code: &AgentCode) -> Result<Vec<Agent>, AgentError> {
        Ok(self.agents.list_downline(agent_code).await?)
    }

    async fn load_start(&self, code: &AgentCode) -> Result<Agent, AgentError> {
        match self.agents.get_agent(code).await {
            Ok(agent) => Ok(agent),
            Err(e) if e.is_not_found() => Err(AgentError::AgentNotFound(code.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn walk(&self, start: &Agent, limit: usize) -> Result<Vec<Agent>, AgentError> {
        let mut visited: HashSet<AgentCode> = HashSet::new();
        visited.insert(start.code.clone());

        let mut chain: Vec<Agent> = Vec::new();
        let mut current = start.clone();

        while chain.len() < limit {
            let Some(referrer_code) = current.referrer.clone() else {
                break;
            };

            if !visited.insert(referrer_code.clone()) {
                let mut codes = vec![start.code.clone()];
                codes.extend(chain.iter().map(|a| a.code.clone()));
                warn!(
                    start = %start.code,
                    repeated = %referrer_code,
                    chain = ?codes,
                    "Referrer cycle detected, aborting upline walk"
                );
                return Err(AgentError::CycleDetected {
                    start: start.code.clone(),
                    repeated: referrer_code,
                    chain: codes,
                });
            }

            let referrer = match self.agents.get_agent(&referrer_code).await {
                Ok(agent) => agent,
                Err(e) if e.is_not_found() => {
                    warn!(agent = %current.code, referrer = %referrer_code, "Dangling referrer reference");
                    return Err(AgentError::MissingReferrer {
                        agent: current.code.clone(),
                        referrer: referrer_code,
                    });
                }
                Err(e) => return Err(e.into()),
            };

            chain.push(referrer.clone());
            current = referrer;
        }

        Ok(chain)
    }
}
