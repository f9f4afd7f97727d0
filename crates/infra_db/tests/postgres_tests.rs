//! Postgres adapter tests
//!
//! Each test starts its own container; run with `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use sqlx::PgPool;
use tokio::task::JoinSet;

use core_kernel::{AgentCode, Currency, FixedClock, PortError, WithdrawalId};
use domain_agent::{AgentPort, HierarchyResolver};
use domain_commission::{CommissionEngine, CommissionRulePort, LineItemStatus, RuleTable};
use domain_settlement::{
    Orchestrator, RetryPolicy, RunOutcome, RunState, RunStore, SettlementError, SettlementQueries,
    SettlementStore, LEASE_EXPIRED_ERROR,
};
use domain_wallet::{
    LedgerTx, WalletError, WalletLedger, WalletReadPort, WalletTransaction, WithdrawalStatus,
};
use infra_db::{PostgresAgentAdapter, PostgresCommissionRuleAdapter, PostgresSettlementStore};
use test_utils::{
    assert_ledger_consistent, db_test, withdrawal_approved, AgentFixtures, PaymentEventBuilder,
    RuleFixtures, TemporalFixtures,
};

struct PgHarness {
    store: Arc<PostgresSettlementStore>,
    orchestrator: Arc<Orchestrator>,
    queries: SettlementQueries,
}

async fn seed(pool: &PgPool) -> PgHarness {
    let agents = Arc::new(PostgresAgentAdapter::new(pool.clone()));
    for agent in AgentFixtures::abc_chain() {
        agents.save_agent(&agent).await.unwrap();
    }
    let rules = Arc::new(PostgresCommissionRuleAdapter::new(pool.clone()));
    rules.save_rules(&RuleFixtures::two_tier()).await.unwrap();

    let store = Arc::new(PostgresSettlementStore::new(pool.clone(), StdDuration::from_secs(2)));
    let engine = CommissionEngine::new(HierarchyResolver::new(agents), RuleTable::new(rules, Currency::MYR));
    let clock = Arc::new(FixedClock::new(TemporalFixtures::mid_february() + Duration::days(1)));
    let orchestrator = Orchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        engine,
        WalletLedger::new(Currency::MYR),
        clock,
    )
    .with_retry_policy(RetryPolicy::immediate(3));

    PgHarness {
        queries: SettlementQueries::new(store.clone(), store.clone(), Currency::MYR),
        orchestrator: Arc::new(orchestrator),
        store,
    }
}

async fn assert_consistent(h: &PgHarness, agent: &str) {
    let code = AgentCode::new(agent);
    let wallet = h.store.get_wallet(&code).await.unwrap().unwrap();
    let mut entries = h.store.transactions_for_agent(&code).await.unwrap();
    entries.reverse();
    assert_ledger_consistent(&wallet, &entries);
}

db_test!(test_agent_round_trip, |pool| {
    let adapter = PostgresAgentAdapter::new(pool.clone());
    for agent in AgentFixtures::abc_chain() {
        adapter.save_agent(&agent).await.unwrap();
    }

    let b = adapter.get_agent(&AgentCode::new("B")).await.unwrap();
    assert_eq!(b.referrer, Some(AgentCode::new("C")));

    let downline = adapter.list_downline(&AgentCode::new("C")).await.unwrap();
    assert_eq!(downline.len(), 1);
    assert_eq!(downline[0].code, AgentCode::new("B"));

    let missing = adapter.get_agent(&AgentCode::new("Z")).await;
    assert!(matches!(missing, Err(PortError::NotFound { .. })));
});

db_test!(test_payment_posts_commission_atomically, |pool| {
    let h = seed(&pool).await;
    let event = PaymentEventBuilder::new().with_basis_minor(10_000).build();

    let (run, created) = h.orchestrator.admit_payment(event.clone()).await.unwrap();
    assert!(created);
    let outcome = h.orchestrator.process_run(run.id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Posted(_)));

    let b = h.queries.wallet_summary(&AgentCode::new("B")).await.unwrap();
    let c = h.queries.wallet_summary(&AgentCode::new("C")).await.unwrap();
    assert_eq!(b.balance.minor_units(), 1000);
    assert_eq!(c.balance.minor_units(), 500);
    assert_consistent(&h, "B").await;
    assert_consistent(&h, "C").await;

    // The same event again maps to the stored run
    let (again, created) = h.orchestrator.admit_payment(event).await.unwrap();
    assert!(!created);
    assert_eq!(again.id, run.id);
    assert_eq!(again.state, RunState::Posted);

    let history = h.queries.commission_history(&AgentCode::new("B")).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, LineItemStatus::Posted);
});

db_test!(test_run_state_compare_and_set, |pool| {
    let h = seed(&pool).await;
    let (run, _) = h
        .orchestrator
        .admit_payment(PaymentEventBuilder::new().build())
        .await
        .unwrap();
    let at = TemporalFixtures::mid_february();

    let claimed = h
        .store
        .transition_run(run.id, RunState::Queued, RunState::Processing, at)
        .await
        .unwrap();
    assert!(claimed.is_some());

    let second = h
        .store
        .transition_run(run.id, RunState::Queued, RunState::Processing, at)
        .await
        .unwrap();
    assert!(second.is_none());
});

db_test!(test_withdrawal_settles_once, |pool| {
    let h = seed(&pool).await;
    let (run, _) = h
        .orchestrator
        .admit_payment(PaymentEventBuilder::new().with_basis_minor(100_000).build())
        .await
        .unwrap();
    h.orchestrator.process_run(run.id).await.unwrap();

    let event = withdrawal_approved("B", 4_000);
    let first = h.orchestrator.withdrawal_approved(event.clone()).await.unwrap();
    assert_eq!(first.request.status, WithdrawalStatus::Paid);
    let second = h.orchestrator.withdrawal_approved(event).await.unwrap();
    assert!(second.already_settled);

    let summary = h.queries.wallet_summary(&AgentCode::new("B")).await.unwrap();
    assert_eq!(summary.balance.minor_units(), 6_000);
    assert_eq!(summary.total_withdrawn.minor_units(), 4_000);
    assert_consistent(&h, "B").await;
});

db_test!(test_overdraw_is_rejected_and_leaves_balance, |pool| {
    let h = seed(&pool).await;
    let (run, _) = h
        .orchestrator
        .admit_payment(PaymentEventBuilder::new().with_basis_minor(30_000).build())
        .await
        .unwrap();
    h.orchestrator.process_run(run.id).await.unwrap();

    let event = withdrawal_approved("B", 5_000);
    let err = h.orchestrator.withdrawal_approved(event.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementError::Wallet(WalletError::InsufficientFunds { .. })
    ));

    let request = h.store.get_withdrawal(event.request_id).await.unwrap();
    assert_eq!(request.status, WithdrawalStatus::Rejected);
    let summary = h.queries.wallet_summary(&AgentCode::new("B")).await.unwrap();
    assert_eq!(summary.balance.minor_units(), 3_000);
});

db_test!(test_rolled_back_transaction_leaves_nothing, |pool| {
    let h = seed(&pool).await;
    {
        let mut tx = h.store.begin().await.unwrap();
        tx.lock_wallet(&AgentCode::new("B"), Currency::MYR).await.unwrap();
        // dropped without commit
    }
    assert!(h.store.get_wallet(&AgentCode::new("B")).await.unwrap().is_none());

    let missing = h.store.get_withdrawal(WithdrawalId::new()).await;
    assert!(matches!(missing, Err(PortError::NotFound { .. })));
});

async fn fund_b(h: &PgHarness, basis_minor: i64) {
    let (run, _) = h
        .orchestrator
        .admit_payment(PaymentEventBuilder::new().with_basis_minor(basis_minor).build())
        .await
        .unwrap();
    h.orchestrator.process_run(run.id).await.unwrap();
}

fn assert_distinct_non_negative_balances(entries: &[WalletTransaction]) {
    let mut seen = std::collections::HashSet::new();
    for entry in entries {
        let after = entry.balance_after.minor_units();
        assert!(after >= 0, "balance went negative: {after}");
        assert!(seen.insert(after), "two entries share balance_after {after}");
    }
}

db_test!(test_concurrent_withdrawals_never_overdraw, |pool| {
    let h = seed(&pool).await;
    fund_b(&h, 100_000).await;

    // 8 x 1_500 against 10_000: six fit, two must be refused
    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let orchestrator = h.orchestrator.clone();
        tasks.spawn(async move {
            orchestrator
                .withdrawal_approved(withdrawal_approved("B", 1_500))
                .await
        });
    }

    let mut paid = 0;
    let mut refused = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(outcome) => {
                assert_eq!(outcome.request.status, WithdrawalStatus::Paid);
                paid += 1;
            }
            Err(SettlementError::Wallet(WalletError::InsufficientFunds { .. })) => refused += 1,
            Err(other) => panic!("unexpected withdrawal failure: {other:?}"),
        }
    }
    assert_eq!(paid, 6);
    assert_eq!(refused, 2);

    let summary = h.queries.wallet_summary(&AgentCode::new("B")).await.unwrap();
    assert_eq!(summary.balance.minor_units(), 1_000);
    assert_eq!(summary.total_withdrawn.minor_units(), 9_000);

    let entries = h.store.transactions_for_agent(&AgentCode::new("B")).await.unwrap();
    assert_eq!(entries.len(), 7);
    assert_distinct_non_negative_balances(&entries);
    assert_consistent(&h, "B").await;
});

db_test!(test_concurrent_postings_to_one_wallet, |pool| {
    let h = seed(&pool).await;
    let mut run_ids = Vec::new();
    for _ in 0..6 {
        let (run, _) = h
            .orchestrator
            .admit_payment(PaymentEventBuilder::new().with_basis_minor(10_000).build())
            .await
            .unwrap();
        run_ids.push(run.id);
    }

    let mut tasks = JoinSet::new();
    for id in run_ids {
        let orchestrator = h.orchestrator.clone();
        tasks.spawn(async move { orchestrator.process_run(id).await });
    }
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.unwrap().unwrap();
        assert!(matches!(outcome, RunOutcome::Posted(_)));
    }

    let b = h.queries.wallet_summary(&AgentCode::new("B")).await.unwrap();
    let c = h.queries.wallet_summary(&AgentCode::new("C")).await.unwrap();
    assert_eq!(b.balance.minor_units(), 6_000);
    assert_eq!(c.balance.minor_units(), 3_000);

    for agent in ["B", "C"] {
        let entries = h.store.transactions_for_agent(&AgentCode::new(agent)).await.unwrap();
        assert_eq!(entries.len(), 6);
        assert_distinct_non_negative_balances(&entries);
        assert_consistent(&h, agent).await;
    }
});

db_test!(test_abandoned_claim_is_failed_after_lease, |pool| {
    let h = seed(&pool).await;
    let (run, _) = h
        .orchestrator
        .admit_payment(PaymentEventBuilder::new().build())
        .await
        .unwrap();
    let claimed_at = TemporalFixtures::mid_february();
    let claimed = h
        .store
        .transition_run(run.id, RunState::Queued, RunState::Processing, claimed_at)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.claimed_at, Some(claimed_at));

    // A cutoff before the claim leaves it alone
    let fresh = h
        .store
        .fail_stale_runs(claimed_at - Duration::minutes(1), LEASE_EXPIRED_ERROR, claimed_at)
        .await
        .unwrap();
    assert!(fresh.is_empty());

    // The harness clock is a day past the claim, well beyond the default lease
    let failed = h.orchestrator.failed_runs().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, run.id);
    assert_eq!(failed[0].last_error.as_deref(), Some(LEASE_EXPIRED_ERROR));

    let requeued = h.orchestrator.retry_run(run.id).await.unwrap();
    assert_eq!(requeued.state, RunState::Queued);
    let outcome = h.orchestrator.process_run(run.id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Posted(_)));
    assert_consistent(&h, "B").await;
});
