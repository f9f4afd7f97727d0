//! Custom Test Assertions
//!
//! Assertion helpers for money and the wallet ledger that print the whole
//! offending entry list on failure.

use core_kernel::Money;
use domain_wallet::{Wallet, WalletTransaction};

/// Asserts two amounts are equal, including currency
pub fn assert_money_eq(actual: &Money, expected: &Money) {
    assert_eq!(
        (actual.currency(), actual.minor_units()),
        (expected.currency(), expected.minor_units()),
        "Money mismatch: actual={}, expected={}",
        actual,
        expected
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: &Money) {
    assert!(money.is_zero(), "Expected zero money, got {}", money);
}

/// Asserts the chain invariant of an agent's ledger
///
/// `entries` must be in append order. Each `balance_after` has to equal the
/// running sum, no running balance may go negative, and the cached wallet
/// balance has to equal the final sum.
pub fn assert_ledger_consistent(wallet: &Wallet, entries: &[WalletTransaction]) {
    let mut running = 0i64;
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(
            entry.agent_code, wallet.agent_code,
            "entry {} belongs to another agent: {:?}",
            i, entry
        );
        running += entry.amount.minor_units();
        assert_eq!(
            entry.balance_after.minor_units(),
            running,
            "entry {} breaks the balance chain: {:#?}",
            i,
            entries
        );
        assert!(running >= 0, "balance went negative at entry {}: {:#?}", i, entries);
    }
    assert_eq!(
        wallet.balance.minor_units(),
        running,
        "cached balance {} differs from ledger sum {}",
        wallet.balance,
        running
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_kernel::{AgentCode, Currency, LineItemId, WalletTransactionId, WithdrawalId};
    use domain_wallet::{SourceRef, TransactionKind};

    fn entry(amount: i64, after: i64, source: SourceRef) -> WalletTransaction {
        WalletTransaction {
            id: WalletTransactionId::new(),
            agent_code: AgentCode::new("B"),
            kind: if amount >= 0 { TransactionKind::Credit } else { TransactionKind::Debit },
            amount: Money::from_minor(amount, Currency::MYR),
            balance_after: Money::from_minor(after, Currency::MYR),
            source,
            created_at: Utc::now(),
        }
    }

    fn wallet(balance: i64) -> Wallet {
        Wallet {
            agent_code: AgentCode::new("B"),
            balance: Money::from_minor(balance, Currency::MYR),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_consistent_ledger_passes() {
        let entries = vec![
            entry(5000, 5000, SourceRef::line_item(LineItemId::new())),
            entry(-3000, 2000, SourceRef::withdrawal(WithdrawalId::new())),
        ];
        assert_ledger_consistent(&wallet(2000), &entries);
    }

    #[test]
    #[should_panic(expected = "cached balance")]
    fn test_drifted_cache_fails() {
        let entries = vec![entry(5000, 5000, SourceRef::line_item(LineItemId::new()))];
        assert_ledger_consistent(&wallet(4000), &entries);
    }
}
