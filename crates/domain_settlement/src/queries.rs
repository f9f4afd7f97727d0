//! Outbound read models: wallet summary and commission history

use std::sync::Arc;

use tracing::instrument;

use core_kernel::{AgentCode, Currency, Money};
use domain_commission::{CommissionHistoryPort, CommissionLineItem, LineItemStatus};
use domain_wallet::{SourceRef, WalletReadPort, WalletSummary, WithdrawalStatus};

use crate::error::SettlementError;

#[derive(Clone)]
pub struct SettlementQueries {
    wallets: Arc<dyn WalletReadPort>,
    history: Arc<dyn CommissionHistoryPort>,
    currency: Currency,
}

impl SettlementQueries {
    pub fn new(
        wallets: Arc<dyn WalletReadPort>,
        history: Arc<dyn CommissionHistoryPort>,
        currency: Currency,
    ) -> Self {
        Self {
            wallets,
            history,
            currency,
        }
    }

    /// Balance, available funds, lifetime totals and unposted commission
    ///
    /// `total_earned` is net of reversals. An agent without a wallet gets an
    /// all-zero summary.
    #[instrument(skip(self), fields(agent = %agent))]
    pub async fn wallet_summary(&self, agent: &AgentCode) -> Result<WalletSummary, SettlementError> {
        let zero = Money::zero(self.currency);
        let balance = self
            .wallets
            .get_wallet(agent)
            .await?
            .map_or(zero, |w| w.balance);

        let mut total_earned = zero;
        let mut total_withdrawn = zero;
        for entry in self.wallets.transactions_for_agent(agent).await? {
            match entry.source {
                SourceRef::LineItem { .. } | SourceRef::Reversal { .. } => {
                    total_earned = total_earned.checked_add(&entry.amount)?;
                }
                SourceRef::Withdrawal { .. } => {
                    total_withdrawn = total_withdrawn.checked_sub(&entry.amount)?;
                }
                SourceRef::Manual { .. } => {}
            }
        }

        let reserved: Vec<Money> = self
            .wallets
            .withdrawals_for_agent(agent)
            .await?
            .into_iter()
            .filter(|w| w.status == WithdrawalStatus::Approved)
            .map(|w| w.amount)
            .collect();
        let available = balance.checked_sub(&Money::sum(self.currency, reserved.iter())?)?;

        let pending: Vec<Money> = self
            .history
            .line_items_for_agent(agent)
            .await?
            .into_iter()
            .filter(|i| i.status == LineItemStatus::Pending)
            .map(|i| i.amount)
            .collect();
        let pending_commission = Money::sum(self.currency, pending.iter())?;

        Ok(WalletSummary {
            agent_code: agent.clone(),
            balance,
            available,
            total_earned,
            total_withdrawn,
            pending_commission,
        })
    }

    /// Line items earned by an agent, newest first
    pub async fn commission_history(
        &self,
        agent: &AgentCode,
    ) -> Result<Vec<CommissionLineItem>, SettlementError> {
        Ok(self.history.line_items_for_agent(agent).await?)
    }
}
