//! Wallet Domain Ports
//!
//! - [`LedgerTx`]: wallet, ledger and withdrawal writes inside a caller-owned
//!   transaction. `lock_wallet` must hold the wallet exclusively until the
//!   transaction ends (`SELECT ... FOR UPDATE` in Postgres).
//! - [`WalletReadPort`]: committed state for queries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use core_kernel::{AgentCode, Currency, DomainPort, Money, PortError, WithdrawalId};

use crate::transaction::WalletTransaction;
use crate::wallet::Wallet;
use crate::withdrawal::WithdrawalRequest;

/// Aggregates over an agent's ledger entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Sum of all signed amounts
    pub sum: Money,
    pub entry_count: usize,
    pub last_balance_after: Option<Money>,
}

#[async_trait]
pub trait LedgerTx: Send {
    /// Locks the agent's wallet, creating an empty one on first use
    async fn lock_wallet(&mut self, agent: &AgentCode, currency: Currency) -> Result<Wallet, PortError>;

    /// Appends a ledger entry; entries are never updated afterwards
    async fn append_entry(&mut self, entry: &WalletTransaction) -> Result<(), PortError>;

    /// Writes the cached balance of a locked wallet
    async fn store_balance(&mut self, wallet: &Wallet) -> Result<(), PortError>;

    async fn ledger_totals(
        &mut self,
        agent: &AgentCode,
        currency: Currency,
    ) -> Result<LedgerTotals, PortError>;

    /// Fails with `PortError::Conflict` if the id is already used
    async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), PortError>;

    /// Reads a withdrawal request, locking it until the transaction ends
    async fn lock_withdrawal(&mut self, id: WithdrawalId) -> Result<WithdrawalRequest, PortError>;

    async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), PortError>;

    /// Sum of approved withdrawals that have not been paid yet
    async fn approved_unpaid_total(
        &mut self,
        agent: &AgentCode,
        currency: Currency,
    ) -> Result<Money, PortError>;
}

/// Read side over committed wallet state
#[async_trait]
pub trait WalletReadPort: DomainPort {
    async fn get_wallet(&self, agent: &AgentCode) -> Result<Option<Wallet>, PortError>;

    /// Ledger entries of an agent, newest first
    async fn transactions_for_agent(
        &self,
        agent: &AgentCode,
    ) -> Result<Vec<WalletTransaction>, PortError>;

    /// Withdrawal requests of an agent, newest first
    async fn withdrawals_for_agent(
        &self,
        agent: &AgentCode,
    ) -> Result<Vec<WithdrawalRequest>, PortError>;

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalRequest, PortError>;
}

/// Mock implementation of LedgerTx for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use chrono::Utc;

    use crate::withdrawal::WithdrawalStatus;

    /// In-memory ledger standing in for an open transaction
    #[derive(Debug, Default)]
    pub struct MockLedgerTx {
        pub wallets: HashMap<AgentCode, Wallet>,
        pub entries: Vec<WalletTransaction>,
        pub withdrawals: HashMap<WithdrawalId, WithdrawalRequest>,
    }

    impl MockLedgerTx {
        pub fn new() -> Self {
            Self::default()
        }

        /// Overwrites a cached balance without a ledger entry, to simulate drift
        pub fn corrupt_balance(&mut self, agent: &AgentCode, balance: Money) {
            if let Some(wallet) = self.wallets.get_mut(agent) {
                wallet.balance = balance;
            }
        }

        pub fn entries_for(&self, agent: &AgentCode) -> Vec<&WalletTransaction> {
            self.entries.iter().filter(|e| &e.agent_code == agent).collect()
        }
    }

    #[async_trait]
    impl LedgerTx for MockLedgerTx {
        async fn lock_wallet(
            &mut self,
            agent: &AgentCode,
            currency: Currency,
        ) -> Result<Wallet, PortError> {
            Ok(self
                .wallets
                .entry(agent.clone())
                .or_insert_with(|| Wallet::empty(agent.clone(), currency, Utc::now()))
                .clone())
        }

        async fn append_entry(&mut self, entry: &WalletTransaction) -> Result<(), PortError> {
            self.entries.push(entry.clone());
            Ok(())
        }

        async fn store_balance(&mut self, wallet: &Wallet) -> Result<(), PortError> {
            self.wallets.insert(wallet.agent_code.clone(), wallet.clone());
            Ok(())
        }

        async fn ledger_totals(
            &mut self,
            agent: &AgentCode,
            currency: Currency,
        ) -> Result<LedgerTotals, PortError> {
            let entries = self.entries_for(agent);
            let sum = Money::sum(currency, entries.iter().map(|e| &e.amount))
                .map_err(|e| PortError::internal(e.to_string()))?;
            Ok(LedgerTotals {
                sum,
                entry_count: entries.len(),
                last_balance_after: entries.last().map(|e| e.balance_after),
            })
        }

        async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), PortError> {
            if self.withdrawals.contains_key(&request.id) {
                return Err(PortError::conflict(format!(
                    "withdrawal {} already exists",
                    request.id
                )));
            }
            self.withdrawals.insert(request.id, request.clone());
            Ok(())
        }

        async fn lock_withdrawal(
            &mut self,
            id: WithdrawalId,
        ) -> Result<WithdrawalRequest, PortError> {
            self.withdrawals
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("WithdrawalRequest", id))
        }

        async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), PortError> {
            self.withdrawals.insert(request.id, request.clone());
            Ok(())
        }

        async fn approved_unpaid_total(
            &mut self,
            agent: &AgentCode,
            currency: Currency,
        ) -> Result<Money, PortError> {
            let approved: Vec<Money> = self
                .withdrawals
                .values()
                .filter(|w| &w.agent_code == agent && w.status == WithdrawalStatus::Approved)
                .map(|w| w.amount)
                .collect();
            Money::sum(currency, approved.iter()).map_err(|e| PortError::internal(e.to_string()))
        }
    }
}
