//! Row to domain conversions
//!
//! Stored strings are parsed strictly; an unknown value means the row was
//! written by something other than these adapters and surfaces as
//! `DatabaseError::SerializationError`.

use std::str::FromStr;

use core_kernel::{
    AgentCode, CommissionRuleId, CommissionRunId, Currency, LineItemId, Money, PaymentId, PlanId,
    PolicyId, Rate, ValidPeriod, WalletTransactionId, WithdrawalId,
};
use domain_agent::{Agent, AgentStatus};
use domain_commission::{
    CommissionLineItem, CommissionRule, CompletedPayment, LineItemStatus, PaymentFrequency,
    RuleBasis,
};
use domain_settlement::{CommissionRun, RunState};
use domain_wallet::{TransactionKind, Wallet, WalletTransaction, WithdrawalRequest, WithdrawalStatus};

use crate::error::DatabaseError;
use crate::repositories::{
    AgentRow, CommissionRuleRow, LineItemRow, PaymentRow, RunRow, WalletRow, WalletTransactionRow,
    WithdrawalRow,
};

pub(crate) fn currency(code: &str) -> Result<Currency, DatabaseError> {
    Currency::from_str(code).map_err(|_| DatabaseError::corrupt("currency", code))
}

fn money(minor: i64, code: &str) -> Result<Money, DatabaseError> {
    Ok(Money::from_minor(minor, currency(code)?))
}

fn tier(level: i16, column: &str) -> Result<u8, DatabaseError> {
    u8::try_from(level).map_err(|_| DatabaseError::corrupt(column, level))
}

pub(crate) fn row_to_agent(row: AgentRow) -> Result<Agent, DatabaseError> {
    let status = AgentStatus::parse(&row.status)
        .ok_or_else(|| DatabaseError::corrupt("agents.status", &row.status))?;
    Ok(Agent {
        code: AgentCode::new(&row.code),
        name: row.name,
        referrer: row.referrer_code.map(AgentCode::new),
        status,
        joined_at: row.joined_at,
    })
}

pub(crate) fn agent_to_row(agent: &Agent) -> AgentRow {
    AgentRow {
        code: agent.code.as_str().to_string(),
        name: agent.name.clone(),
        referrer_code: agent.referrer.as_ref().map(|r| r.as_str().to_string()),
        status: agent.status.as_str().to_string(),
        joined_at: agent.joined_at,
    }
}

pub(crate) fn row_to_rule(row: CommissionRuleRow) -> Result<CommissionRule, DatabaseError> {
    let basis = match row.basis_type.as_str() {
        "percentage" => {
            let pct = row
                .percentage
                .ok_or_else(|| DatabaseError::corrupt("commission_rules.percentage", "NULL"))?;
            let rate = Rate::from_percentage(pct)
                .map_err(|_| DatabaseError::corrupt("commission_rules.percentage", pct))?;
            RuleBasis::Percentage(rate)
        }
        "fixed" => {
            let minor = row
                .fixed_amount_minor
                .ok_or_else(|| DatabaseError::corrupt("commission_rules.fixed_amount_minor", "NULL"))?;
            let code = row
                .currency
                .as_deref()
                .ok_or_else(|| DatabaseError::corrupt("commission_rules.currency", "NULL"))?;
            RuleBasis::Fixed(money(minor, code)?)
        }
        other => return Err(DatabaseError::corrupt("commission_rules.basis_type", other)),
    };
    let frequency = PaymentFrequency::from_str(&row.frequency)
        .map_err(|_| DatabaseError::corrupt("commission_rules.frequency", &row.frequency))?;
    let effective = ValidPeriod::new(row.effective_from, row.effective_to)
        .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

    Ok(CommissionRule {
        id: CommissionRuleId::from_uuid(row.rule_id),
        plan_id: PlanId::new(&row.plan_id),
        tier_level: tier(row.tier_level, "commission_rules.tier_level")?,
        frequency,
        basis,
        active: row.active,
        effective,
        created_at: row.created_at,
    })
}

pub(crate) fn rule_to_row(rule: &CommissionRule) -> CommissionRuleRow {
    let (basis_type, percentage, fixed_amount_minor, currency) = match &rule.basis {
        RuleBasis::Percentage(rate) => ("percentage", Some(rate.as_percentage()), None, None),
        RuleBasis::Fixed(amount) => (
            "fixed",
            None,
            Some(amount.minor_units()),
            Some(amount.currency().code().to_string()),
        ),
    };
    CommissionRuleRow {
        rule_id: *rule.id.as_uuid(),
        plan_id: rule.plan_id.as_str().to_string(),
        tier_level: i16::from(rule.tier_level),
        frequency: rule.frequency.as_str().to_string(),
        basis_type: basis_type.to_string(),
        percentage,
        fixed_amount_minor,
        currency,
        active: rule.active,
        effective_from: rule.effective.start,
        effective_to: rule.effective.end,
        created_at: rule.created_at,
    }
}

pub(crate) fn row_to_payment(row: PaymentRow) -> Result<CompletedPayment, DatabaseError> {
    let frequency = PaymentFrequency::from_str(&row.frequency)
        .map_err(|_| DatabaseError::corrupt("commission_payments.frequency", &row.frequency))?;
    Ok(CompletedPayment {
        payment_id: PaymentId::from_uuid(row.payment_id),
        policy_id: PolicyId::from_uuid(row.policy_id),
        agent_code: AgentCode::new(&row.agent_code),
        plan_id: PlanId::new(&row.plan_id),
        frequency,
        basis: money(row.basis_minor, &row.currency)?,
        completed_at: row.completed_at,
    })
}

pub(crate) fn payment_to_row(payment: &CompletedPayment) -> PaymentRow {
    PaymentRow {
        payment_id: *payment.payment_id.as_uuid(),
        policy_id: *payment.policy_id.as_uuid(),
        agent_code: payment.agent_code.as_str().to_string(),
        plan_id: payment.plan_id.as_str().to_string(),
        frequency: payment.frequency.as_str().to_string(),
        basis_minor: payment.basis.minor_units(),
        currency: payment.basis.currency().code().to_string(),
        completed_at: payment.completed_at,
    }
}

pub(crate) fn row_to_line_item(row: LineItemRow) -> Result<CommissionLineItem, DatabaseError> {
    let status = LineItemStatus::parse(&row.status)
        .ok_or_else(|| DatabaseError::corrupt("commission_line_items.status", &row.status))?;
    Ok(CommissionLineItem {
        id: LineItemId::from_uuid(row.line_item_id),
        payment_id: PaymentId::from_uuid(row.payment_id),
        agent_code: AgentCode::new(&row.agent_code),
        level: tier(row.level, "commission_line_items.level")?,
        basis: money(row.basis_minor, &row.currency)?,
        amount: money(row.amount_minor, &row.currency)?,
        rule_id: CommissionRuleId::from_uuid(row.rule_id),
        status,
        wallet_transaction_id: row.wallet_transaction_id.map(WalletTransactionId::from_uuid),
        created_at: row.created_at,
        posted_at: row.posted_at,
        reversed_at: row.reversed_at,
    })
}

pub(crate) fn line_item_to_row(item: &CommissionLineItem) -> LineItemRow {
    LineItemRow {
        line_item_id: *item.id.as_uuid(),
        payment_id: *item.payment_id.as_uuid(),
        agent_code: item.agent_code.as_str().to_string(),
        level: i16::from(item.level),
        basis_minor: item.basis.minor_units(),
        amount_minor: item.amount.minor_units(),
        currency: item.amount.currency().code().to_string(),
        rule_id: *item.rule_id.as_uuid(),
        status: item.status.as_str().to_string(),
        wallet_transaction_id: item.wallet_transaction_id.map(|id| *id.as_uuid()),
        created_at: item.created_at,
        posted_at: item.posted_at,
        reversed_at: item.reversed_at,
    }
}

pub(crate) fn row_to_wallet(row: WalletRow) -> Result<Wallet, DatabaseError> {
    Ok(Wallet {
        agent_code: AgentCode::new(&row.agent_code),
        balance: money(row.balance_minor, &row.currency)?,
        updated_at: row.updated_at,
    })
}

pub(crate) fn wallet_to_row(wallet: &Wallet) -> WalletRow {
    WalletRow {
        agent_code: wallet.agent_code.as_str().to_string(),
        balance_minor: wallet.balance.minor_units(),
        currency: wallet.currency().code().to_string(),
        updated_at: wallet.updated_at,
    }
}

pub(crate) fn row_to_transaction(row: WalletTransactionRow) -> Result<WalletTransaction, DatabaseError> {
    let kind = TransactionKind::parse(&row.kind)
        .ok_or_else(|| DatabaseError::corrupt("wallet_transactions.kind", &row.kind))?;
    Ok(WalletTransaction {
        id: WalletTransactionId::from_uuid(row.transaction_id),
        agent_code: AgentCode::new(&row.agent_code),
        kind,
        amount: money(row.amount_minor, &row.currency)?,
        balance_after: money(row.balance_after_minor, &row.currency)?,
        source: serde_json::from_value(row.source)?,
        created_at: row.created_at,
    })
}

pub(crate) fn transaction_to_row(entry: &WalletTransaction) -> Result<WalletTransactionRow, DatabaseError> {
    Ok(WalletTransactionRow {
        transaction_id: *entry.id.as_uuid(),
        agent_code: entry.agent_code.as_str().to_string(),
        kind: entry.kind.as_str().to_string(),
        amount_minor: entry.amount.minor_units(),
        balance_after_minor: entry.balance_after.minor_units(),
        currency: entry.amount.currency().code().to_string(),
        source_type: entry.source.kind_str().to_string(),
        source: serde_json::to_value(&entry.source)?,
        created_at: entry.created_at,
    })
}

pub(crate) fn row_to_withdrawal(row: WithdrawalRow) -> Result<WithdrawalRequest, DatabaseError> {
    let status = WithdrawalStatus::parse(&row.status)
        .ok_or_else(|| DatabaseError::corrupt("withdrawal_requests.status", &row.status))?;
    Ok(WithdrawalRequest {
        id: WithdrawalId::from_uuid(row.withdrawal_id),
        agent_code: AgentCode::new(&row.agent_code),
        amount: money(row.amount_minor, &row.currency)?,
        status,
        requested_at: row.requested_at,
        decided_at: row.decided_at,
        paid_at: row.paid_at,
        rejection_reason: row.rejection_reason,
        transaction_id: row.transaction_id.map(WalletTransactionId::from_uuid),
    })
}

pub(crate) fn withdrawal_to_row(request: &WithdrawalRequest) -> WithdrawalRow {
    WithdrawalRow {
        withdrawal_id: *request.id.as_uuid(),
        agent_code: request.agent_code.as_str().to_string(),
        amount_minor: request.amount.minor_units(),
        currency: request.amount.currency().code().to_string(),
        status: request.status.as_str().to_string(),
        requested_at: request.requested_at,
        decided_at: request.decided_at,
        paid_at: request.paid_at,
        rejection_reason: request.rejection_reason.clone(),
        transaction_id: request.transaction_id.map(|id| *id.as_uuid()),
    }
}

pub(crate) fn row_to_run(row: RunRow) -> Result<CommissionRun, DatabaseError> {
    let state = RunState::parse(&row.state)
        .ok_or_else(|| DatabaseError::corrupt("commission_runs.state", &row.state))?;
    Ok(CommissionRun {
        id: CommissionRunId::from_uuid(row.run_id),
        payment: serde_json::from_value(row.payment)?,
        state,
        attempts: u32::try_from(row.attempts)
            .map_err(|_| DatabaseError::corrupt("commission_runs.attempts", row.attempts))?,
        last_error: row.last_error,
        claimed_at: row.claimed_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub(crate) fn run_to_row(run: &CommissionRun) -> Result<RunRow, DatabaseError> {
    Ok(RunRow {
        run_id: *run.id.as_uuid(),
        payment_id: *run.payment.payment_id.as_uuid(),
        payment: serde_json::to_value(&run.payment)?,
        state: run.state.as_str().to_string(),
        attempts: i32::try_from(run.attempts).unwrap_or(i32::MAX),
        last_error: run.last_error.clone(),
        claimed_at: run.claimed_at,
        created_at: run.created_at,
        updated_at: run.updated_at,
    })
}
