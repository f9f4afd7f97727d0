//! Wallet balance cache and summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{AgentCode, Currency, Money};

/// Cached balance of an agent's wallet
///
/// Updated in the same transaction as every ledger append and always
/// re-derivable by summing the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub agent_code: AgentCode,
    pub balance: Money,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn empty(agent_code: AgentCode, currency: Currency, at: DateTime<Utc>) -> Self {
        Self {
            agent_code,
            balance: Money::zero(currency),
            updated_at: at,
        }
    }

    pub fn currency(&self) -> Currency {
        self.balance.currency()
    }
}

/// Agent-facing view of a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSummary {
    pub agent_code: AgentCode,
    /// Settled balance
    pub balance: Money,
    /// Balance minus approved but unpaid withdrawals
    pub available: Money,
    pub total_earned: Money,
    pub total_withdrawn: Money,
    /// Calculated commission not yet posted to the wallet
    pub pending_commission: Money,
}

/// Result of comparing the cached balance against the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub agent_code: AgentCode,
    pub cached_balance: Money,
    pub ledger_sum: Money,
    /// `balance_after` of the newest entry, if any
    pub last_balance_after: Option<Money>,
    pub entry_count: usize,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.cached_balance == self.ledger_sum
            && self.last_balance_after.map_or(self.ledger_sum.is_zero(), |b| b == self.ledger_sum)
    }
}
