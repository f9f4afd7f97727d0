//! End-to-end settlement tests over the in-memory store

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal_macros::dec;

use core_kernel::{
    AgentCode, Clock, CommissionRunId, Currency, FixedClock, LineItemId, PaymentId, PlanId,
    PolicyId, Rate, ValidPeriod, WithdrawalId,
};
use domain_agent::{Agent, HierarchyResolver, MockAgentPort};
use domain_commission::{
    CommissionEngine, CommissionRule, LineItemStatus, MockCommissionRulePort, PaymentFrequency,
    PaymentSource, RuleTable,
};
use domain_settlement::{
    InMemorySettlementStore, JobQueue, Orchestrator, PaymentCompleted, RetryPolicy, RunOutcome,
    RunState, RunStore, SettlementError, SettlementQueries, SettlementService, SettlementStore,
    WithdrawalApproved, WorkerPool, LEASE_EXPIRED_ERROR,
};
use domain_wallet::{WalletLedger, WalletReadPort, WithdrawalStatus};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn plan() -> PlanId {
    PlanId::new("LIFE01")
}

fn pct_rule(tier: u8, pct: rust_decimal::Decimal) -> CommissionRule {
    CommissionRule::percentage(
        plan(),
        tier,
        PaymentFrequency::Monthly,
        Rate::from_percentage(pct).unwrap(),
        ValidPeriod::from(t0()),
        t0(),
    )
    .unwrap()
}

fn agent(code: &str, referrer: Option<&str>) -> Agent {
    let a = Agent::new(AgentCode::new(code), code, t0());
    match referrer {
        Some(r) => a.with_referrer(AgentCode::new(r)),
        None => a,
    }
}

fn abc() -> Vec<Agent> {
    vec![agent("A", Some("B")), agent("B", Some("C")), agent("C", None)]
}

fn code(c: &str) -> AgentCode {
    AgentCode::new(c)
}

fn payment_event(agent: &str, minor: i64, completed_at: DateTime<Utc>) -> PaymentCompleted {
    PaymentCompleted {
        payment_id: PaymentId::new(),
        policy_id: PolicyId::new(),
        agent_code: AgentCode::new(agent),
        plan_id: plan(),
        basis_amount_minor: minor,
        currency: Currency::MYR,
        frequency: PaymentFrequency::Monthly,
        completed_at,
    }
}

struct Harness {
    store: Arc<InMemorySettlementStore>,
    orchestrator: Arc<Orchestrator>,
    queries: SettlementQueries,
    clock: Arc<FixedClock>,
}

async fn harness(agents: Vec<Agent>) -> Harness {
    let agents = Arc::new(MockAgentPort::with_agents(agents).await);
    let rules = Arc::new(
        MockCommissionRulePort::with_rules(vec![pct_rule(1, dec!(10)), pct_rule(2, dec!(5))]).await,
    );
    let engine = CommissionEngine::new(HierarchyResolver::new(agents), RuleTable::new(rules, Currency::MYR));
    let clock = Arc::new(FixedClock::new(t0() + Duration::days(40)));
    let store = Arc::new(InMemorySettlementStore::with_clock(clock.clone()));

    let orchestrator = Orchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        engine,
        WalletLedger::new(Currency::MYR),
        clock.clone(),
    )
    .with_retry_policy(RetryPolicy::immediate(3))
    .with_processing_lease(std::time::Duration::from_secs(600));

    Harness {
        queries: SettlementQueries::new(store.clone(), store.clone(), Currency::MYR),
        orchestrator: Arc::new(orchestrator),
        store,
        clock,
    }
}

impl Harness {
    async fn balance(&self, agent: &str) -> i64 {
        self.queries
            .wallet_summary(&code(agent))
            .await
            .unwrap()
            .balance
            .minor_units()
    }

    async fn admit_and_process(&self, event: PaymentCompleted) -> (CommissionRunId, RunOutcome) {
        let (run, _) = self.orchestrator.admit_payment(event).await.unwrap();
        let outcome = self.orchestrator.process_run(run.id).await.unwrap();
        (run.id, outcome)
    }
}

// ============================================================================
// Commission runs
// ============================================================================

mod run_tests {
    use super::*;

    #[tokio::test]
    async fn test_two_level_payment_posts_once() {
        let h = harness(abc()).await;
        let event = payment_event("A", 10_000, t0() + Duration::days(10));

        let (run_id, outcome) = h.admit_and_process(event.clone()).await;
        let RunOutcome::Posted(summary) = outcome else {
            panic!("expected posted run");
        };
        assert_eq!(summary.line_items, 2);
        assert_eq!(summary.credits.len(), 2);
        assert_eq!(summary.total_amount.minor_units(), 1500);
        assert_eq!(h.balance("B").await, 1000);
        assert_eq!(h.balance("C").await, 500);
        assert_eq!(h.balance("A").await, 0);

        let run = h.orchestrator.get_run(run_id).await.unwrap();
        assert_eq!(run.state, RunState::Posted);
        assert_eq!(run.attempts, 1);

        // Duplicate event: same run, nothing processed
        let (again, created) = h.orchestrator.admit_payment(event.clone()).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, run_id);
        assert!(matches!(
            h.orchestrator.process_run(run_id).await.unwrap(),
            RunOutcome::Skipped
        ));

        // Direct re-settlement reuses the line items and posts nothing
        let payment = event.into_payment().unwrap();
        let rerun = h.orchestrator.settle_payment(&payment).await.unwrap();
        assert!(rerun.reused);
        assert!(rerun.credits.is_empty());

        assert_eq!(h.store.all_entries().await.len(), 2);
        assert_eq!(h.balance("B").await, 1000);
        assert_eq!(h.balance("C").await, 500);
    }

    #[tokio::test]
    async fn test_commission_history_newest_first() {
        let h = harness(abc()).await;
        h.admit_and_process(payment_event("A", 10_000, t0() + Duration::days(1)))
            .await;
        h.clock.advance(Duration::hours(1));
        h.admit_and_process(payment_event("A", 20_000, t0() + Duration::days(2)))
            .await;

        let history = h.queries.commission_history(&code("B")).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount.minor_units(), 2000);
        assert_eq!(history[1].amount.minor_units(), 1000);
        assert!(history.iter().all(|i| i.status == LineItemStatus::Posted));
        assert!(history.iter().all(|i| i.wallet_transaction_id.is_some()));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let h = harness(abc()).await;
        h.store.fail_next_commits(2);

        let (run_id, outcome) = h
            .admit_and_process(payment_event("A", 10_000, t0() + Duration::days(10)))
            .await;

        assert!(matches!(outcome, RunOutcome::Posted(_)));
        let run = h.orchestrator.get_run(run_id).await.unwrap();
        assert_eq!(run.attempts, 3);
        assert_eq!(run.last_error, None);
        assert_eq!(h.balance("B").await, 1000);
        assert_eq!(h.store.all_line_items().await.len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_run_until_operator_retry() {
        let h = harness(abc()).await;
        h.store.fail_next_commits(10);

        let (run_id, outcome) = h
            .admit_and_process(payment_event("A", 10_000, t0() + Duration::days(10)))
            .await;

        let RunOutcome::Failed(err) = outcome else {
            panic!("expected failed run");
        };
        assert!(err.is_transient());
        let run = h.orchestrator.get_run(run_id).await.unwrap();
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.attempts, 4);
        assert!(run.last_error.is_some());
        assert!(h.store.all_line_items().await.is_empty());

        let failed = h.orchestrator.failed_runs().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, run_id);

        // A failed run is never picked up without an operator
        assert!(matches!(
            h.orchestrator.process_run(run_id).await.unwrap(),
            RunOutcome::Skipped
        ));

        h.store.fail_next_commits(0);
        let requeued = h.orchestrator.retry_run(run_id).await.unwrap();
        assert_eq!(requeued.state, RunState::Queued);
        assert!(matches!(
            h.orchestrator.process_run(run_id).await.unwrap(),
            RunOutcome::Posted(_)
        ));
        assert_eq!(h.orchestrator.get_run(run_id).await.unwrap().attempts, 5);
        assert!(h.orchestrator.failed_runs().await.unwrap().is_empty());
        assert_eq!(h.balance("B").await, 1000);
    }

    #[tokio::test]
    async fn test_cycle_fails_immediately_without_line_items() {
        let h = harness(vec![agent("A", Some("B")), agent("B", Some("A"))]).await;

        let (run_id, outcome) = h
            .admit_and_process(payment_event("A", 10_000, t0() + Duration::days(10)))
            .await;

        let RunOutcome::Failed(err) = outcome else {
            panic!("expected failed run");
        };
        assert!(err.is_data_integrity());
        assert_eq!(h.orchestrator.get_run(run_id).await.unwrap().attempts, 1);
        assert!(h.store.all_line_items().await.is_empty());
        assert!(h.store.all_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_only_from_queued() {
        let h = harness(abc()).await;
        let (run, _) = h
            .orchestrator
            .admit_payment(payment_event("A", 10_000, t0()))
            .await
            .unwrap();

        let cancelled = h.orchestrator.cancel_run(run.id).await.unwrap();
        assert_eq!(cancelled.state, RunState::Cancelled);
        assert!(matches!(
            h.orchestrator.process_run(run.id).await.unwrap(),
            RunOutcome::Skipped
        ));

        let err = h.orchestrator.cancel_run(run.id).await.unwrap_err();
        assert!(matches!(err, SettlementError::InvalidRunTransition { .. }));
        let err = h.orchestrator.retry_run(run.id).await.unwrap_err();
        assert!(matches!(err, SettlementError::InvalidRunTransition { .. }));
    }

    #[tokio::test]
    async fn test_posted_run_cannot_be_cancelled() {
        let h = harness(abc()).await;
        let (run_id, _) = h.admit_and_process(payment_event("A", 10_000, t0())).await;

        let err = h.orchestrator.cancel_run(run_id).await.unwrap_err();
        match err {
            SettlementError::InvalidRunTransition { from, .. } => assert_eq!(from, "posted"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let h = harness(abc()).await;
        let err = h
            .orchestrator
            .process_run(CommissionRunId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::RunNotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_events_are_rejected() {
        let h = harness(abc()).await;

        let mut foreign = payment_event("A", 10_000, t0());
        foreign.currency = Currency::SGD;
        let err = h.orchestrator.admit_payment(foreign).await.unwrap_err();
        assert!(matches!(err, SettlementError::InvalidEvent(_)));

        let err = h
            .orchestrator
            .admit_payment(payment_event("A", 0, t0()))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidEvent(_)));
        assert!(h.orchestrator.failed_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_commission_is_reported_until_posted() {
        let h = harness(abc()).await;
        let payment = payment_event("A", 10_000, t0()).into_payment().unwrap();

        let mut tx = h.store.begin().await.unwrap();
        h.orchestrator
            .engine()
            .calculate_for_payment(tx.as_mut(), &payment, h.clock.as_ref())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let summary = h.queries.wallet_summary(&code("B")).await.unwrap();
        assert_eq!(summary.pending_commission.minor_units(), 1000);
        assert_eq!(summary.balance.minor_units(), 0);

        let posted = h.orchestrator.settle_payment(&payment).await.unwrap();
        assert!(posted.reused);
        assert_eq!(posted.credits.len(), 2);

        let summary = h.queries.wallet_summary(&code("B")).await.unwrap();
        assert_eq!(summary.pending_commission.minor_units(), 0);
        assert_eq!(summary.balance.minor_units(), 1000);
        assert_eq!(summary.total_earned.minor_units(), 1000);
    }

    #[tokio::test]
    async fn test_rolled_back_transaction_leaves_no_trace() {
        let h = harness(abc()).await;
        let payment = payment_event("A", 10_000, t0()).into_payment().unwrap();

        let mut tx = h.store.begin().await.unwrap();
        h.orchestrator
            .engine()
            .calculate_for_payment(tx.as_mut(), &payment, h.clock.as_ref())
            .await
            .unwrap();
        drop(tx);

        assert!(h.store.all_line_items().await.is_empty());
        assert_eq!(h.store.commit_count(), 0);
    }
}

// ============================================================================
// Processing lease
// ============================================================================

mod lease_tests {
    use super::*;

    /// Claims a run the way a worker does, without ever finishing it
    async fn claim_and_abandon(h: &Harness, run_id: CommissionRunId) {
        let claimed = h
            .store
            .transition_run(run_id, RunState::Queued, RunState::Processing, h.clock.now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.claimed_at, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn test_abandoned_run_fails_after_lease_and_can_be_retried() {
        let h = harness(abc()).await;
        let (run, _) = h
            .orchestrator
            .admit_payment(payment_event("A", 10_000, t0() + Duration::days(10)))
            .await
            .unwrap();
        claim_and_abandon(&h, run.id).await;

        // Within the lease the claim is respected
        h.clock.advance(Duration::minutes(5));
        assert!(h.orchestrator.failed_runs().await.unwrap().is_empty());
        assert!(matches!(
            h.orchestrator.process_run(run.id).await.unwrap(),
            RunOutcome::Skipped
        ));

        h.clock.advance(Duration::minutes(6));
        let failed = h.orchestrator.failed_runs().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, run.id);
        assert_eq!(failed[0].state, RunState::Failed);
        assert_eq!(failed[0].last_error.as_deref(), Some(LEASE_EXPIRED_ERROR));

        let requeued = h.orchestrator.retry_run(run.id).await.unwrap();
        assert_eq!(requeued.state, RunState::Queued);
        assert!(matches!(
            h.orchestrator.process_run(run.id).await.unwrap(),
            RunOutcome::Posted(_)
        ));
        assert_eq!(h.balance("B").await, 1000);
        assert_eq!(h.balance("C").await, 500);
        assert!(h.orchestrator.failed_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_monthly_batch_requeues_only_expired_claims() {
        let h = harness(abc()).await;
        let (stale, _) = h
            .orchestrator
            .admit_payment(payment_event("A", 10_000, t0() + Duration::days(3)))
            .await
            .unwrap();
        claim_and_abandon(&h, stale.id).await;
        h.clock.advance(Duration::minutes(11));

        let (fresh, _) = h
            .orchestrator
            .admit_payment(payment_event("A", 20_000, t0() + Duration::days(4)))
            .await
            .unwrap();
        claim_and_abandon(&h, fresh.id).await;

        let report = h.orchestrator.monthly_batch(2024, 1).await.unwrap();
        assert_eq!(report.payments_scanned, 2);
        assert_eq!(report.runs_expired, 1);
        assert_eq!(report.runs_requeued, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.enqueued, vec![stale.id]);

        assert!(matches!(
            h.orchestrator.process_run(stale.id).await.unwrap(),
            RunOutcome::Posted(_)
        ));
        assert_eq!(h.balance("B").await, 1000);
        assert_eq!(
            h.orchestrator.get_run(fresh.id).await.unwrap().state,
            RunState::Processing
        );
    }

    #[tokio::test]
    async fn test_run_outcome_write_is_retried() {
        let h = harness(abc()).await;
        h.store.fail_next_run_updates(2);

        let (run_id, outcome) = h
            .admit_and_process(payment_event("A", 10_000, t0() + Duration::days(10)))
            .await;
        assert!(matches!(outcome, RunOutcome::Posted(_)));
        assert_eq!(
            h.orchestrator.get_run(run_id).await.unwrap().state,
            RunState::Posted
        );
        assert_eq!(h.balance("B").await, 1000);
    }

    #[tokio::test]
    async fn test_unrecorded_outcome_recovers_without_double_posting() {
        let h = harness(abc()).await;
        let (run, _) = h
            .orchestrator
            .admit_payment(payment_event("A", 10_000, t0() + Duration::days(10)))
            .await
            .unwrap();

        // Credits commit, but the run record cannot be written back
        h.store.fail_next_run_updates(4);
        let err = h.orchestrator.process_run(run.id).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            h.orchestrator.get_run(run.id).await.unwrap().state,
            RunState::Processing
        );
        assert_eq!(h.balance("B").await, 1000);

        h.clock.advance(Duration::minutes(11));
        let failed = h.orchestrator.failed_runs().await.unwrap();
        assert_eq!(failed.len(), 1);

        h.orchestrator.retry_run(run.id).await.unwrap();
        let RunOutcome::Posted(summary) = h.orchestrator.process_run(run.id).await.unwrap() else {
            panic!("expected posted run");
        };
        assert!(summary.reused);
        assert!(summary.credits.is_empty());
        assert_eq!(h.balance("B").await, 1000);
        assert_eq!(h.balance("C").await, 500);
    }
}

// ============================================================================
// Reversals and reconciliation
// ============================================================================

mod ledger_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_reverse_posted_line_item() {
        let h = harness(abc()).await;
        h.admit_and_process(payment_event("A", 10_000, t0())).await;
        let item = h.queries.commission_history(&code("B")).await.unwrap()[0].clone();

        let entry = h
            .orchestrator
            .reverse_line_item(item.id, "admin", "policy cancelled in free-look period")
            .await
            .unwrap();
        assert_eq!(entry.amount.minor_units(), -1000);
        assert_eq!(h.balance("B").await, 0);

        let history = h.queries.commission_history(&code("B")).await.unwrap();
        assert_eq!(history[0].status, LineItemStatus::Reversed);

        let err = h
            .orchestrator
            .reverse_line_item(item.id, "admin", "again")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::LineItemNotPosted(_)));

        let summary = h.queries.wallet_summary(&code("B")).await.unwrap();
        assert_eq!(summary.total_earned.minor_units(), 0);
    }

    #[tokio::test]
    async fn test_reverse_unknown_line_item() {
        let h = harness(abc()).await;
        let err = h
            .orchestrator
            .reverse_line_item(LineItemId::new(), "admin", "typo")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Commission(_)));
    }

    #[tokio::test]
    async fn test_reconcile_detects_drift() {
        let h = harness(abc()).await;
        h.admit_and_process(payment_event("A", 10_000, t0())).await;

        let report = h.orchestrator.reconcile_wallet(&code("B")).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.entry_count, 1);

        h.store
            .corrupt_balance(&code("B"), core_kernel::Money::from_minor(999, Currency::MYR))
            .await;
        let report = h.orchestrator.reconcile_wallet(&code("B")).await.unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.ledger_sum.minor_units(), 1000);
    }
}

// ============================================================================
// Withdrawals
// ============================================================================

mod withdrawal_tests {
    use super::*;

    fn approved(agent: &str, minor: i64) -> WithdrawalApproved {
        WithdrawalApproved {
            request_id: WithdrawalId::new(),
            agent_code: code(agent),
            amount_minor: minor,
        }
    }

    #[tokio::test]
    async fn test_withdrawal_above_balance_is_rejected() {
        let h = harness(abc()).await;
        h.orchestrator
            .adjust_wallet(&code("B"), 3_000, "admin", "opening balance")
            .await
            .unwrap();

        let event = approved("B", 5_000);
        let err = h
            .orchestrator
            .withdrawal_approved(event.clone())
            .await
            .unwrap_err();
        assert!(err.is_insufficient_funds());

        let request = h.store.get_withdrawal(event.request_id).await.unwrap();
        assert_eq!(request.status, WithdrawalStatus::Rejected);
        assert!(request.rejection_reason.is_some());
        assert_eq!(h.balance("B").await, 3_000);
    }

    #[tokio::test]
    async fn test_withdrawal_settles_exactly_once() {
        let h = harness(abc()).await;
        h.orchestrator
            .adjust_wallet(&code("B"), 5_000, "admin", "opening balance")
            .await
            .unwrap();

        let event = approved("B", 3_000);
        let outcome = h.orchestrator.withdrawal_approved(event.clone()).await.unwrap();
        assert!(!outcome.already_settled);
        assert_eq!(outcome.request.status, WithdrawalStatus::Paid);
        let entry = outcome.transaction.unwrap();
        assert_eq!(entry.amount.minor_units(), -3_000);
        assert_eq!(entry.balance_after.minor_units(), 2_000);

        let again = h.orchestrator.withdrawal_approved(event).await.unwrap();
        assert!(again.already_settled);
        assert!(again.transaction.is_none());
        assert_eq!(h.balance("B").await, 2_000);

        let summary = h.queries.wallet_summary(&code("B")).await.unwrap();
        assert_eq!(summary.total_withdrawn.minor_units(), 3_000);
    }

    #[tokio::test]
    async fn test_approval_of_existing_request() {
        let h = harness(abc()).await;
        h.orchestrator
            .adjust_wallet(&code("B"), 5_000, "admin", "opening balance")
            .await
            .unwrap();
        let id = WithdrawalId::new();
        h.orchestrator
            .request_withdrawal(id, &code("B"), 4_000)
            .await
            .unwrap();

        let mismatched = WithdrawalApproved {
            request_id: id,
            agent_code: code("B"),
            amount_minor: 4_500,
        };
        let err = h.orchestrator.withdrawal_approved(mismatched).await.unwrap_err();
        assert!(matches!(err, SettlementError::InvalidEvent(_)));

        let outcome = h
            .orchestrator
            .withdrawal_approved(WithdrawalApproved {
                request_id: id,
                agent_code: code("B"),
                amount_minor: 4_000,
            })
            .await
            .unwrap();
        assert_eq!(outcome.request.status, WithdrawalStatus::Paid);
        assert_eq!(h.balance("B").await, 1_000);
    }

    #[tokio::test]
    async fn test_withdrawal_commit_contention_is_retried() {
        let h = harness(abc()).await;
        h.orchestrator
            .adjust_wallet(&code("B"), 5_000, "admin", "opening balance")
            .await
            .unwrap();
        h.store.fail_next_commits(1);

        let outcome = h.orchestrator.withdrawal_approved(approved("B", 1_000)).await.unwrap();
        assert_eq!(outcome.request.status, WithdrawalStatus::Paid);
        assert_eq!(h.balance("B").await, 4_000);
    }
}

// ============================================================================
// Monthly batch
// ============================================================================

mod batch_tests {
    use super::*;

    #[tokio::test]
    async fn test_monthly_batch_requeues_everything_not_posted() {
        let h = harness(abc()).await;
        let jan = |day: i64| t0() + Duration::days(day);

        let (posted, _) = h.admit_and_process(payment_event("A", 10_000, jan(3))).await;

        h.store.fail_next_commits(4);
        let (failed, outcome) = h.admit_and_process(payment_event("A", 20_000, jan(5))).await;
        assert!(matches!(outcome, RunOutcome::Failed(_)));

        let (queued, _) = h
            .orchestrator
            .admit_payment(payment_event("A", 30_000, jan(7)))
            .await
            .unwrap();

        // Recorded upstream but never admitted as a run
        let orphan = payment_event("A", 40_000, jan(9)).into_payment().unwrap();
        h.store.record_payment(&orphan).await.unwrap();

        // February payment is out of scope for the January batch
        h.orchestrator
            .admit_payment(payment_event("A", 50_000, jan(40)))
            .await
            .unwrap();

        let report = h.orchestrator.monthly_batch(2024, 1).await.unwrap();
        assert_eq!(report.payments_scanned, 4);
        assert_eq!(report.already_posted, 1);
        assert_eq!(report.runs_requeued, 1);
        assert_eq!(report.runs_created, 1);
        assert_eq!(report.enqueued.len(), 3);
        assert!(report.enqueued.contains(&failed));
        assert!(report.enqueued.contains(&queued.id));
        assert!(!report.enqueued.contains(&posted));

        // Re-running before processing changes nothing material
        let again = h.orchestrator.monthly_batch(2024, 1).await.unwrap();
        assert_eq!(again.enqueued.len(), 3);
        assert_eq!(again.runs_created, 0);
        assert_eq!(again.runs_requeued, 0);

        for run_id in &report.enqueued {
            assert!(matches!(
                h.orchestrator.process_run(*run_id).await.unwrap(),
                RunOutcome::Posted(_)
            ));
        }
        // Duplicate enqueue from the second batch is skipped
        for run_id in &again.enqueued {
            assert!(matches!(
                h.orchestrator.process_run(*run_id).await.unwrap(),
                RunOutcome::Skipped
            ));
        }

        let settled = h.orchestrator.monthly_batch(2024, 1).await.unwrap();
        assert_eq!(settled.already_posted, 4);
        assert!(settled.enqueued.is_empty());
        assert_eq!(h.balance("B").await, 10_000);
    }

    #[tokio::test]
    async fn test_invalid_month() {
        let h = harness(abc()).await;
        let err = h.orchestrator.monthly_batch(2024, 13).await.unwrap_err();
        assert!(matches!(err, SettlementError::Temporal(_)));
    }
}

// ============================================================================
// Worker pool
// ============================================================================

mod worker_tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_processes_submitted_payments() {
        let h = harness(abc()).await;
        let (queue, receiver) = JobQueue::channel(16);
        let pool = WorkerPool::start(h.orchestrator.clone(), receiver, 3);
        let service = SettlementService::new(h.orchestrator.clone(), queue);

        let mut run_ids = Vec::new();
        for day in 0..5 {
            let run = service
                .submit_payment(payment_event("A", 10_000, t0() + Duration::days(day)))
                .await
                .unwrap();
            run_ids.push(run.id);
        }
        pool.shutdown().await;

        for id in run_ids {
            assert_eq!(
                h.orchestrator.get_run(id).await.unwrap().state,
                RunState::Posted
            );
        }
        assert_eq!(h.balance("B").await, 5_000);
        assert_eq!(h.balance("C").await, 2_500);
        assert_eq!(h.store.all_entries().await.len(), 10);
    }

    #[tokio::test]
    async fn test_submit_withdrawal_waits_for_outcome() {
        let h = harness(abc()).await;
        h.orchestrator
            .adjust_wallet(&code("C"), 2_000, "admin", "opening balance")
            .await
            .unwrap();
        let (queue, receiver) = JobQueue::channel(4);
        let pool = WorkerPool::start(h.orchestrator.clone(), receiver, 2);
        let service = SettlementService::new(h.orchestrator.clone(), queue);

        let outcome = service
            .submit_withdrawal(WithdrawalApproved {
                request_id: WithdrawalId::new(),
                agent_code: code("C"),
                amount_minor: 1_500,
            })
            .await
            .unwrap();
        assert_eq!(outcome.request.status, WithdrawalStatus::Paid);

        let err = service
            .submit_withdrawal(WithdrawalApproved {
                request_id: WithdrawalId::new(),
                agent_code: code("C"),
                amount_minor: 1_500,
            })
            .await
            .unwrap_err();
        assert!(err.is_insufficient_funds());

        pool.shutdown().await;
        assert_eq!(h.balance("C").await, 500);
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped() {
        let (queue, receiver) = JobQueue::channel(1);
        drop(receiver);
        let err = queue
            .enqueue(domain_settlement::Job::ProcessCommission(CommissionRunId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::QueueClosed));
        assert!(queue.is_closed());
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Processing every payment twice posts each commission exactly once and
    /// keeps every wallet reconciled
    #[test]
    fn prop_no_double_posting(amounts in proptest::collection::vec(1i64..5_000_000, 1..8)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let h = harness(abc()).await;
            let mut expected_b = 0i64;
            let mut expected_c = 0i64;

            for (i, minor) in amounts.iter().enumerate() {
                let event = payment_event("A", *minor, t0() + Duration::days(i as i64));
                let payment = event.clone().into_payment().unwrap();
                h.admit_and_process(event).await;
                h.orchestrator.settle_payment(&payment).await.unwrap();

                let basis = payment.basis;
                expected_b += Rate::from_percentage(dec!(10)).unwrap().apply(&basis).unwrap().minor_units();
                expected_c += Rate::from_percentage(dec!(5)).unwrap().apply(&basis).unwrap().minor_units();
            }

            let b = h.balance("B").await;
            let c = h.balance("C").await;
            prop_assert_eq!(b, expected_b);
            prop_assert_eq!(c, expected_c);
            for agent in ["B", "C"] {
                let report = h.orchestrator.reconcile_wallet(&code(agent)).await.unwrap();
                prop_assert!(report.is_consistent());
            }
            Ok(())
        })?;
    }
}
