//! Commission rule DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{Currency, Money, PlanId, Rate, ValidPeriod};
use domain_commission::{CommissionRule, PaymentFrequency, RuleBasis};

use crate::error::ApiError;

/// Payout of a rule as sent by operators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleBasisDto {
    /// Percentage of the payment basis, e.g. `"10.5"`
    Percentage { percentage: Decimal },
    Fixed { amount_minor: i64, currency: Currency },
}

#[derive(Debug, Deserialize, Validate)]
pub struct RuleRequest {
    #[validate(length(min = 1, max = 32))]
    pub plan_id: String,
    #[validate(range(min = 1, max = 5))]
    pub tier_level: u8,
    pub frequency: PaymentFrequency,
    pub basis: RuleBasisDto,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
}

impl RuleRequest {
    /// Builds a validated rule created at `now`
    pub fn into_rule(self, now: DateTime<Utc>) -> Result<CommissionRule, ApiError> {
        let basis = match self.basis {
            RuleBasisDto::Percentage { percentage } => RuleBasis::Percentage(
                Rate::from_percentage(percentage).map_err(|e| ApiError::Validation(e.to_string()))?,
            ),
            RuleBasisDto::Fixed {
                amount_minor,
                currency,
            } => RuleBasis::Fixed(Money::from_minor(amount_minor, currency)),
        };
        let effective = ValidPeriod::new(self.effective_from, self.effective_to)
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        Ok(CommissionRule::new(
            PlanId::new(self.plan_id),
            self.tier_level,
            self.frequency,
            basis,
            effective,
            now,
        )?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RuleResponse {
    pub rule_id: Uuid,
    pub plan_id: String,
    pub tier_level: u8,
    pub frequency: PaymentFrequency,
    pub basis: RuleBasisDto,
    pub active: bool,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<CommissionRule> for RuleResponse {
    fn from(rule: CommissionRule) -> Self {
        let basis = match rule.basis {
            RuleBasis::Percentage(rate) => RuleBasisDto::Percentage {
                percentage: rate.as_percentage(),
            },
            RuleBasis::Fixed(amount) => RuleBasisDto::Fixed {
                amount_minor: amount.minor_units(),
                currency: amount.currency(),
            },
        };
        Self {
            rule_id: *rule.id.as_uuid(),
            plan_id: rule.plan_id.to_string(),
            tier_level: rule.tier_level,
            frequency: rule.frequency,
            basis,
            active: rule.active,
            effective_from: rule.effective.start,
            effective_to: rule.effective.end,
            created_at: rule.created_at,
        }
    }
}

/// Rules closed or deactivated by an override
#[derive(Debug, Serialize)]
pub struct SupersedeResponse {
    pub rule: RuleResponse,
    pub superseded: Vec<Uuid>,
}
