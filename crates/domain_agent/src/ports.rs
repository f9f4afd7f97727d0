//! Agent Domain Ports
//!
//! The `AgentPort` trait is the read/write seam for agent records. The
//! hierarchy resolver only ever reads through it, so resolution stays a pure
//! query over whatever store backs the port.
//!
//! - **Postgres Adapter**: `infra_db::adapters::PostgresAgentAdapter`
//! - **Mock Adapter**: in-memory, for tests (`mock` feature)

use async_trait::async_trait;

use core_kernel::{AgentCode, DomainPort, HealthCheckable, PortError};

use crate::agent::Agent;

/// Persistence port for agent records
#[async_trait]
pub trait AgentPort: DomainPort + HealthCheckable {
    /// Retrieves an agent by code
    ///
    /// # Returns
    ///
    /// The agent if found, or `PortError::NotFound`
    async fn get_agent(&self, code: &AgentCode) -> Result<Agent, PortError>;

    /// Inserts or replaces an agent record
    async fn save_agent(&self, agent: &Agent) -> Result<(), PortError>;

    /// Lists the agents whose direct referrer is `code`
    async fn list_downline(&self, code: &AgentCode) -> Result<Vec<Agent>, PortError>;
}

/// Mock implementation of AgentPort for testing
///
/// This adapter stores agents in memory and is useful for unit testing
/// without database dependencies.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;
    use chrono::Utc;

    use core_kernel::{AdapterHealth, HealthCheckResult};

    /// In-memory mock implementation of AgentPort
    #[derive(Debug, Default)]
    pub struct MockAgentPort {
        agents: Arc<RwLock<HashMap<AgentCode, Agent>>>,
        reads: AtomicUsize,
    }

    impl MockAgentPort {
        /// Creates a new mock port
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates with agents for testing
        pub async fn with_agents(agents: Vec<Agent>) -> Self {
            let port = Self::new();
            {
                let mut map = port.agents.write().await;
                for agent in agents {
                    map.insert(agent.code.clone(), agent);
                }
            }
            port
        }

        /// Number of `get_agent` calls served, used to assert walks terminate
        pub fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl DomainPort for MockAgentPort {}

    #[async_trait]
    impl HealthCheckable for MockAgentPort {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "mock-agent-port".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: Some("Mock adapter always healthy".to_string()),
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl AgentPort for MockAgentPort {
        async fn get_agent(&self, code: &AgentCode) -> Result<Agent, PortError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.agents
                .read()
                .await
                .get(code)
                .cloned()
                .ok_or_else(|| PortError::not_found("Agent", code))
        }

        async fn save_agent(&self, agent: &Agent) -> Result<(), PortError> {
            self.agents
                .write()
                .await
                .insert(agent.code.clone(), agent.clone());
            Ok(())
        }

        async fn list_downline(&self, code: &AgentCode) -> Result<Vec<Agent>, PortError> {
            let agents = self.agents.read().await;
            let mut downline: Vec<Agent> = agents
                .values()
                .filter(|a| a.referrer.as_ref() == Some(code))
                .cloned()
                .collect();
            downline.sort_by(|a, b| a.code.cmp(&b.code));
            Ok(downline)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::mock::MockAgentPort;
    use chrono::Utc;

    #[tokio::test]
    async fn test_mock_port_save_and_get() {
        let port = MockAgentPort::new();
        let agent = Agent::new(AgentCode::new("AG001"), "Aisyah", Utc::now());

        port.save_agent(&agent).await.unwrap();

        let fetched = port.get_agent(&AgentCode::new("ag001")).await.unwrap();
        assert_eq!(fetched, agent);
    }

    #[tokio::test]
    async fn test_mock_port_not_found() {
        let port = MockAgentPort::new();
        let result = port.get_agent(&AgentCode::new("NOPE")).await;

        assert!(matches!(result, Err(PortError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_mock_port_downline() {
        let root = AgentCode::new("ROOT");
        let port = MockAgentPort::with_agents(vec![
            Agent::new(root.clone(), "Root", Utc::now()),
            Agent::new(AgentCode::new("B"), "B", Utc::now()).with_referrer(root.clone()),
            Agent::new(AgentCode::new("A"), "A", Utc::now()).with_referrer(root.clone()),
            Agent::new(AgentCode::new("C"), "C", Utc::now()).with_referrer(AgentCode::new("A")),
        ])
        .await;

        let downline = port.list_downline(&root).await.unwrap();
        let codes: Vec<_> = downline.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B"]);
    }
}
