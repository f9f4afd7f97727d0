//! Wallet ledger operations
//!
//! Every write locks the wallet through [`LedgerTx::lock_wallet`], reads the
//! balance under that lock, appends one entry and stores the new cached
//! balance, all inside the caller's transaction.
//!
//! # Invariants
//!
//! - `balance_after` of each entry = previous balance + signed amount
//! - The cached balance equals the sum of the ledger after every commit
//! - Entries are never modified; corrections are `Adjustment` entries
//! - No operation leaves a wallet with a negative balance

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use core_kernel::{AgentCode, Clock, Currency, LineItemId, Money, WalletTransactionId, WithdrawalId};

use crate::error::WalletError;
use crate::ports::LedgerTx;
use crate::transaction::{SourceRef, TransactionKind, WalletTransaction};
use crate::wallet::{Reconciliation, Wallet};
use crate::withdrawal::{WithdrawalRequest, WithdrawalStatus};

/// Wallet ledger service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLedger {
    currency: Currency,
    /// Smallest amount an agent may request to withdraw
    min_withdrawal: Money,
}

impl WalletLedger {
    pub fn new(currency: Currency) -> Self {
        Self {
            currency,
            min_withdrawal: Money::zero(currency),
        }
    }

    pub fn with_min_withdrawal(mut self, minor_units: i64) -> Self {
        self.min_withdrawal = Money::from_minor(minor_units, self.currency);
        self
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Appends a credit entry
    ///
    /// # Errors
    ///
    /// `InvalidAmount` if `amount` is not strictly positive
    #[instrument(skip(self, tx, clock), fields(agent = %agent, amount = %amount))]
    pub async fn post_credit<T>(
        &self,
        tx: &mut T,
        agent: &AgentCode,
        amount: Money,
        source: SourceRef,
        clock: &dyn Clock,
    ) -> Result<WalletTransaction, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        ensure_positive(&amount)?;
        let wallet = tx.lock_wallet(agent, amount.currency()).await?;
        self.append(tx, wallet, TransactionKind::Credit, amount, source, clock).await
    }

    /// Appends a debit entry of `-amount`
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is not strictly positive
    /// - `InsufficientFunds` if the locked balance is below `amount`
    #[instrument(skip(self, tx, clock), fields(agent = %agent, amount = %amount))]
    pub async fn post_debit<T>(
        &self,
        tx: &mut T,
        agent: &AgentCode,
        amount: Money,
        source: SourceRef,
        clock: &dyn Clock,
    ) -> Result<WalletTransaction, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        ensure_positive(&amount)?;
        let wallet = tx.lock_wallet(agent, amount.currency()).await?;
        if wallet.balance.minor_units() < amount.minor_units() {
            warn!(balance = %wallet.balance, "Debit rejected, insufficient funds");
            return Err(WalletError::InsufficientFunds {
                agent: agent.clone(),
                requested: amount,
                available: wallet.balance,
            });
        }
        self.append(tx, wallet, TransactionKind::Debit, -amount, source, clock).await
    }

    /// Appends a signed manual correction
    ///
    /// # Errors
    ///
    /// - `MissingAuditInfo` if actor or reason is blank
    /// - `InvalidAmount` for a zero adjustment
    /// - `NegativeBalance` if the result would be below zero
    #[instrument(skip(self, tx, clock), fields(agent = %agent, amount = %signed_amount, actor = actor))]
    pub async fn post_adjustment<T>(
        &self,
        tx: &mut T,
        agent: &AgentCode,
        signed_amount: Money,
        actor: &str,
        reason: &str,
        clock: &dyn Clock,
    ) -> Result<WalletTransaction, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        if actor.trim().is_empty() || reason.trim().is_empty() {
            return Err(WalletError::MissingAuditInfo);
        }
        self.adjust(tx, agent, signed_amount, SourceRef::manual(actor, reason), clock)
            .await
    }

    /// Offsets a posted commission credit with a negative adjustment
    pub async fn reverse_credit<T>(
        &self,
        tx: &mut T,
        agent: &AgentCode,
        line_item_id: LineItemId,
        amount: Money,
        actor: &str,
        reason: &str,
        clock: &dyn Clock,
    ) -> Result<WalletTransaction, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        if actor.trim().is_empty() || reason.trim().is_empty() {
            return Err(WalletError::MissingAuditInfo);
        }
        ensure_positive(&amount)?;
        let source = SourceRef::Reversal {
            line_item_id,
            actor: actor.to_string(),
            reason: reason.to_string(),
        };
        self.adjust(tx, agent, -amount, source, clock).await
    }

    /// Balance derived from the ledger
    pub async fn get_balance<T>(&self, tx: &mut T, agent: &AgentCode) -> Result<Money, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        Ok(tx.ledger_totals(agent, self.currency).await?.sum)
    }

    /// Compares the cached balance with the ledger
    #[instrument(skip(self, tx), fields(agent = %agent))]
    pub async fn reconcile<T>(
        &self,
        tx: &mut T,
        agent: &AgentCode,
    ) -> Result<Reconciliation, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        let wallet = tx.lock_wallet(agent, self.currency).await?;
        let totals = tx.ledger_totals(agent, self.currency).await?;

        let report = Reconciliation {
            agent_code: agent.clone(),
            cached_balance: wallet.balance,
            ledger_sum: totals.sum,
            last_balance_after: totals.last_balance_after,
            entry_count: totals.entry_count,
        };
        if report.is_consistent() {
            debug!(entries = report.entry_count, "Wallet reconciled");
        } else {
            warn!(
                cached = %report.cached_balance,
                ledger = %report.ledger_sum,
                "Wallet balance drift detected"
            );
        }
        Ok(report)
    }

    /// Records a new pending withdrawal request
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is not strictly positive
    /// - `BelowMinimum` if `amount` is under the configured minimum
    pub async fn request_withdrawal<T>(
        &self,
        tx: &mut T,
        id: WithdrawalId,
        agent: &AgentCode,
        amount: Money,
        clock: &dyn Clock,
    ) -> Result<WithdrawalRequest, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        ensure_positive(&amount)?;
        if amount.currency() != self.currency {
            return Err(core_kernel::MoneyError::CurrencyMismatch(
                amount.currency().to_string(),
                self.currency.to_string(),
            )
            .into());
        }
        if amount.minor_units() < self.min_withdrawal.minor_units() {
            return Err(WalletError::BelowMinimum {
                requested: amount,
                minimum: self.min_withdrawal,
            });
        }

        let request = WithdrawalRequest::new(id, agent.clone(), amount, clock.now());
        tx.insert_withdrawal(&request).await?;
        info!(withdrawal_id = %id, agent = %agent, amount = %amount, "Withdrawal requested");
        Ok(request)
    }

    /// Approves a pending request if the available balance covers it
    ///
    /// Available balance is the locked balance minus other approved but
    /// unpaid requests, so approvals can never add up to an overdraft.
    #[instrument(skip(self, tx, clock), fields(withdrawal_id = %id))]
    pub async fn approve_withdrawal<T>(
        &self,
        tx: &mut T,
        id: WithdrawalId,
        clock: &dyn Clock,
    ) -> Result<WithdrawalRequest, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut request = self.load_withdrawal(tx, id).await?;
        if request.status != WithdrawalStatus::Pending {
            return Err(WalletError::InvalidStateTransition {
                id,
                from: request.status.as_str().to_string(),
                to: WithdrawalStatus::Approved.as_str().to_string(),
            });
        }

        let available = self.available_balance(tx, &request.agent_code).await?;
        if available.minor_units() < request.amount.minor_units() {
            warn!(agent = %request.agent_code, requested = %request.amount, available = %available, "Withdrawal approval rejected, insufficient funds");
            return Err(WalletError::InsufficientFunds {
                agent: request.agent_code.clone(),
                requested: request.amount,
                available,
            });
        }

        request.approve(clock.now())?;
        tx.update_withdrawal(&request).await?;
        info!(agent = %request.agent_code, amount = %request.amount, "Withdrawal approved");
        Ok(request)
    }

    pub async fn reject_withdrawal<T>(
        &self,
        tx: &mut T,
        id: WithdrawalId,
        reason: &str,
        clock: &dyn Clock,
    ) -> Result<WithdrawalRequest, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut request = self.load_withdrawal(tx, id).await?;
        request.reject(reason, clock.now())?;
        tx.update_withdrawal(&request).await?;
        info!(withdrawal_id = %id, reason = reason, "Withdrawal rejected");
        Ok(request)
    }

    /// Debits the wallet for an approved request and marks it paid
    #[instrument(skip(self, tx, clock), fields(withdrawal_id = %id))]
    pub async fn settle_withdrawal<T>(
        &self,
        tx: &mut T,
        id: WithdrawalId,
        clock: &dyn Clock,
    ) -> Result<(WithdrawalRequest, WalletTransaction), WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut request = self.load_withdrawal(tx, id).await?;
        if request.status != WithdrawalStatus::Approved {
            return Err(WalletError::InvalidStateTransition {
                id,
                from: request.status.as_str().to_string(),
                to: WithdrawalStatus::Paid.as_str().to_string(),
            });
        }

        let entry = self
            .post_debit(tx, &request.agent_code, request.amount, SourceRef::withdrawal(id), clock)
            .await?;
        request.mark_paid(entry.id, clock.now())?;
        tx.update_withdrawal(&request).await?;
        info!(agent = %request.agent_code, amount = %request.amount, "Withdrawal paid");
        Ok((request, entry))
    }

    /// Locked balance minus approved but unpaid withdrawals
    pub async fn available_balance<T>(
        &self,
        tx: &mut T,
        agent: &AgentCode,
    ) -> Result<Money, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        let wallet = tx.lock_wallet(agent, self.currency).await?;
        let reserved = tx.approved_unpaid_total(agent, self.currency).await?;
        Ok(wallet.balance.checked_sub(&reserved)?)
    }

    async fn load_withdrawal<T>(
        &self,
        tx: &mut T,
        id: WithdrawalId,
    ) -> Result<WithdrawalRequest, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        match tx.lock_withdrawal(id).await {
            Ok(request) => Ok(request),
            Err(e) if e.is_not_found() => Err(WalletError::WithdrawalNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn adjust<T>(
        &self,
        tx: &mut T,
        agent: &AgentCode,
        signed_amount: Money,
        source: SourceRef,
        clock: &dyn Clock,
    ) -> Result<WalletTransaction, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        if signed_amount.is_zero() {
            return Err(WalletError::InvalidAmount("adjustment must not be zero".to_string()));
        }
        let wallet = tx.lock_wallet(agent, signed_amount.currency()).await?;
        let resulting = wallet.balance.checked_add(&signed_amount)?;
        if resulting.is_negative() {
            return Err(WalletError::NegativeBalance {
                agent: agent.clone(),
                adjustment: signed_amount,
                resulting,
            });
        }
        self.append(tx, wallet, TransactionKind::Adjustment, signed_amount, source, clock)
            .await
    }

    async fn append<T>(
        &self,
        tx: &mut T,
        mut wallet: Wallet,
        kind: TransactionKind,
        signed_amount: Money,
        source: SourceRef,
        clock: &dyn Clock,
    ) -> Result<WalletTransaction, WalletError>
    where
        T: LedgerTx + ?Sized,
    {
        let now = clock.now();
        let balance_after = wallet.balance.checked_add(&signed_amount)?;

        let entry = WalletTransaction {
            id: WalletTransactionId::new_v7(),
            agent_code: wallet.agent_code.clone(),
            kind,
            amount: signed_amount,
            balance_after,
            source,
            created_at: now,
        };
        tx.append_entry(&entry).await?;

        wallet.balance = balance_after;
        wallet.updated_at = now;
        tx.store_balance(&wallet).await?;

        debug!(
            kind = kind.as_str(),
            amount = %signed_amount,
            balance_after = %balance_after,
            "Ledger entry appended"
        );
        Ok(entry)
    }
}

fn ensure_positive(amount: &Money) -> Result<(), WalletError> {
    if !amount.is_positive() {
        return Err(WalletError::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}
