//! Commission run DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_settlement::CommissionRun;

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: Uuid,
    pub payment_id: Uuid,
    pub agent_code: String,
    pub state: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Start of the latest processing round
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CommissionRun> for RunResponse {
    fn from(run: CommissionRun) -> Self {
        Self {
            run_id: *run.id.as_uuid(),
            payment_id: *run.payment.payment_id.as_uuid(),
            agent_code: run.payment.agent_code.to_string(),
            state: run.state.as_str().to_string(),
            attempts: run.attempts,
            last_error: run.last_error,
            claimed_at: run.claimed_at,
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}

/// Calendar month in the business timezone
#[derive(Debug, Deserialize, Validate)]
pub struct MonthlyBatchRequest {
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
    #[validate(range(min = 1, max = 12))]
    pub month: u32,
}
