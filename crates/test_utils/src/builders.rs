//! Test Data Builders
//!
//! Builders for agent trees and payment events. Tests specify only the
//! fields they care about and take defaults for everything else.

use chrono::{DateTime, Utc};
use fake::faker::name::en::Name;
use fake::Fake;

use core_kernel::{AgentCode, Currency, PaymentId, PlanId, PolicyId, WithdrawalId};
use domain_agent::{Agent, AgentStatus};
use domain_commission::PaymentFrequency;
use domain_settlement::{PaymentCompleted, WithdrawalApproved};

use crate::fixtures::{CodeFixtures, TemporalFixtures};

/// Builds a referral hierarchy edge by edge
///
/// ```rust,ignore
/// let agents = AgentTreeBuilder::new()
///     .root("C")
///     .recruit("C", "B")
///     .recruit("B", "A")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct AgentTreeBuilder {
    agents: Vec<Agent>,
}

impl AgentTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an agent without a referrer
    pub fn root(mut self, code: &str) -> Self {
        self.agents.push(Self::agent(code));
        self
    }

    /// Adds `code` as a direct recruit of `referrer`
    pub fn recruit(mut self, referrer: &str, code: &str) -> Self {
        self.agents
            .push(Self::agent(code).with_referrer(AgentCode::new(referrer)));
        self
    }

    /// A straight chain where `codes[0]` enrolls and the last code is the root
    pub fn chain(mut self, codes: &[&str]) -> Self {
        for (i, code) in codes.iter().enumerate() {
            let agent = match codes.get(i + 1) {
                Some(referrer) => Self::agent(code).with_referrer(AgentCode::new(referrer)),
                None => Self::agent(code),
            };
            self.agents.push(agent);
        }
        self
    }

    /// Changes the status of an agent already added
    pub fn with_status(mut self, code: &str, status: AgentStatus) -> Self {
        let code = AgentCode::new(code);
        for agent in self.agents.iter_mut().filter(|a| a.code == code) {
            agent.status = status;
        }
        self
    }

    pub fn build(self) -> Vec<Agent> {
        self.agents
    }

    fn agent(code: &str) -> Agent {
        Agent::new(AgentCode::new(code), Name().fake::<String>(), TemporalFixtures::epoch())
    }
}

/// Builder for `PaymentCompleted` events
#[derive(Debug, Clone)]
pub struct PaymentEventBuilder {
    payment_id: PaymentId,
    policy_id: PolicyId,
    agent_code: AgentCode,
    plan_id: PlanId,
    basis_amount_minor: i64,
    currency: Currency,
    frequency: PaymentFrequency,
    completed_at: DateTime<Utc>,
}

impl Default for PaymentEventBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentEventBuilder {
    /// RM 1,000.00 monthly payment on the fixture plan, enrolled by agent A
    pub fn new() -> Self {
        Self {
            payment_id: PaymentId::new(),
            policy_id: PolicyId::new(),
            agent_code: CodeFixtures::agent("A"),
            plan_id: CodeFixtures::plan(),
            basis_amount_minor: 100_000,
            currency: Currency::MYR,
            frequency: PaymentFrequency::Monthly,
            completed_at: TemporalFixtures::mid_february(),
        }
    }

    pub fn with_payment_id(mut self, id: PaymentId) -> Self {
        self.payment_id = id;
        self
    }

    pub fn with_agent(mut self, code: &str) -> Self {
        self.agent_code = AgentCode::new(code);
        self
    }

    pub fn with_plan(mut self, plan: &str) -> Self {
        self.plan_id = PlanId::new(plan);
        self
    }

    pub fn with_basis_minor(mut self, minor: i64) -> Self {
        self.basis_amount_minor = minor;
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_frequency(mut self, frequency: PaymentFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = at;
        self
    }

    pub fn build(self) -> PaymentCompleted {
        PaymentCompleted {
            payment_id: self.payment_id,
            policy_id: self.policy_id,
            agent_code: self.agent_code,
            plan_id: self.plan_id,
            basis_amount_minor: self.basis_amount_minor,
            currency: self.currency,
            frequency: self.frequency,
            completed_at: self.completed_at,
        }
    }
}

/// Builds a `WithdrawalApproved` event with a fresh request id
pub fn withdrawal_approved(agent: &str, amount_minor: i64) -> WithdrawalApproved {
    WithdrawalApproved {
        request_id: WithdrawalId::new(),
        agent_code: AgentCode::new(agent),
        amount_minor,
    }
}
