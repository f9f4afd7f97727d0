//! HTTP tests against the in-memory settlement store
//!
//! The router runs with a real job queue and worker pool, so payment events
//! are processed asynchronously exactly as in the server.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Duration;
use serde_json::{json, Value};
use uuid::Uuid;

use core_kernel::{Clock, Currency, FixedClock, HealthCheckable};
use domain_agent::{AgentPort, HierarchyResolver, MockAgentPort};
use domain_commission::{CommissionEngine, MockCommissionRulePort, RuleTable};
use domain_settlement::{
    InMemorySettlementStore, JobQueue, Orchestrator, RetryPolicy, SettlementQueries,
    SettlementService, WorkerPool,
};
use domain_wallet::WalletLedger;
use interface_api::dto::wallet::{LineItemResponse, WalletSummaryResponse};
use interface_api::{create_router, AppState};
use test_utils::{AgentFixtures, RuleFixtures, TemporalFixtures};

struct TestApp {
    server: TestServer,
    // Dropping the pool stops the workers
    _workers: WorkerPool,
}

async fn spawn_app() -> TestApp {
    let agents = Arc::new(MockAgentPort::with_agents(AgentFixtures::abc_chain()).await);
    let rules = Arc::new(MockCommissionRulePort::with_rules(RuleFixtures::two_tier()).await);
    let store = Arc::new(InMemorySettlementStore::new());
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(
        TemporalFixtures::mid_february() + Duration::days(1),
    ));

    let hierarchy = HierarchyResolver::new(agents.clone());
    let engine = CommissionEngine::new(hierarchy.clone(), RuleTable::new(rules.clone(), Currency::MYR));
    let orchestrator = Arc::new(
        Orchestrator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            engine,
            WalletLedger::new(Currency::MYR),
            clock.clone(),
        )
        .with_retry_policy(RetryPolicy::immediate(3)),
    );
    let (queue, receiver) = JobQueue::channel(64);
    let workers = WorkerPool::start(orchestrator.clone(), receiver, 2);

    let agent_port: Arc<dyn AgentPort> = agents.clone();
    let state = AppState {
        service: SettlementService::new(orchestrator, queue),
        queries: SettlementQueries::new(store.clone(), store.clone(), Currency::MYR),
        agents: agent_port,
        hierarchy,
        clock,
        health: vec![
            agents as Arc<dyn HealthCheckable>,
            rules as Arc<dyn HealthCheckable>,
            store as Arc<dyn HealthCheckable>,
        ],
    };

    TestApp {
        server: TestServer::new(create_router(state)).unwrap(),
        _workers: workers,
    }
}

fn payment_body(payment_id: Uuid, basis_minor: i64) -> Value {
    json!({
        "payment_id": payment_id,
        "policy_id": Uuid::new_v4(),
        "agent_code": "A",
        "plan_id": "LIFE01",
        "basis_amount_minor": basis_minor,
        "currency": "MYR",
        "frequency": "monthly",
        "completed_at": TemporalFixtures::mid_february(),
    })
}

/// Submits a payment and waits until the workers have posted it
async fn post_payment(app: &TestApp, basis_minor: i64) -> String {
    let response = app
        .server
        .post("/api/v1/events/payment-completed")
        .json(&payment_body(Uuid::new_v4(), basis_minor))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let run_id = response.json::<Value>()["run_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_state(app, &run_id, "posted").await;
    run_id
}

async fn wait_for_state(app: &TestApp, run_id: &str, expected: &str) {
    for _ in 0..200 {
        let run = app
            .server
            .get(&format!("/api/v1/runs/{run_id}"))
            .await
            .json::<Value>();
        if run["state"] == expected {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    panic!("run {run_id} never reached {expected}");
}

async fn wallet(app: &TestApp, agent: &str) -> WalletSummaryResponse {
    let response = app.server.get(&format!("/api/v1/agents/{agent}/wallet")).await;
    response.assert_status_ok();
    response.json::<WalletSummaryResponse>()
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = spawn_app().await;

    app.server.get("/health").await.assert_status_ok();

    let ready = app.server.get("/health/ready").await;
    ready.assert_status_ok();
    let body = ready.json::<Value>();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_payment_event_credits_upline() {
    let app = spawn_app().await;

    // RM100.00 with tier 1 at 10% and tier 2 at 5%
    post_payment(&app, 10_000).await;

    assert_eq!(wallet(&app, "B").await.balance_minor, 1_000);
    assert_eq!(wallet(&app, "C").await.balance_minor, 500);
    let a = wallet(&app, "A").await;
    assert_eq!(a.balance_minor, 0);
    assert_eq!(a.currency, "MYR");

    let history = app
        .server
        .get("/api/v1/agents/B/commissions")
        .await
        .json::<Vec<LineItemResponse>>();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].level, 1);
    assert_eq!(history[0].status, "posted");
    assert!(history[0].wallet_transaction_id.is_some());
}

#[tokio::test]
async fn test_replayed_payment_returns_same_run() {
    let app = spawn_app().await;
    let payment_id = Uuid::new_v4();

    let first = app
        .server
        .post("/api/v1/events/payment-completed")
        .json(&payment_body(payment_id, 10_000))
        .await
        .json::<Value>();
    let run_id = first["run_id"].as_str().unwrap().to_string();
    wait_for_state(&app, &run_id, "posted").await;

    let replay = app
        .server
        .post("/api/v1/events/payment-completed")
        .json(&payment_body(payment_id, 10_000))
        .await;
    replay.assert_status(StatusCode::ACCEPTED);
    let replay = replay.json::<Value>();
    assert_eq!(replay["run_id"], first["run_id"]);
    assert_eq!(replay["state"], "posted");

    assert_eq!(wallet(&app, "B").await.balance_minor, 1_000);
}

#[tokio::test]
async fn test_invalid_payment_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/api/v1/events/payment-completed")
        .json(&payment_body(Uuid::new_v4(), 0))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.json::<Value>();
    assert_eq!(body["error"], "validation_error");
    assert!(body["details"][0]
        .as_str()
        .unwrap()
        .starts_with("basis_amount_minor"));

    let wrong_currency = app
        .server
        .post("/api/v1/events/payment-completed")
        .json(&json!({
            "payment_id": Uuid::new_v4(),
            "policy_id": Uuid::new_v4(),
            "agent_code": "A",
            "plan_id": "LIFE01",
            "basis_amount_minor": 10_000,
            "currency": "SGD",
            "frequency": "monthly",
            "completed_at": TemporalFixtures::mid_february(),
        }))
        .await;
    wrong_currency.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/api/v1/events/withdrawal-approved")
        .json(&json!({ "request_id": "not-a-uuid", "agent_code": "B", "amount_minor": 100 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_withdrawal_settles_and_overdraw_is_refused() {
    let app = spawn_app().await;
    // B earns RM30.00
    post_payment(&app, 30_000).await;

    let overdraw = app
        .server
        .post("/api/v1/events/withdrawal-approved")
        .json(&json!({ "request_id": Uuid::new_v4(), "agent_code": "B", "amount_minor": 5_000 }))
        .await;
    overdraw.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(overdraw.json::<Value>()["error"], "insufficient_funds");
    assert_eq!(wallet(&app, "B").await.balance_minor, 3_000);

    let request_id = Uuid::new_v4();
    let body = json!({ "request_id": request_id, "agent_code": "B", "amount_minor": 2_000 });
    let paid = app
        .server
        .post("/api/v1/events/withdrawal-approved")
        .json(&body)
        .await;
    paid.assert_status_ok();
    let paid = paid.json::<Value>();
    assert_eq!(paid["status"], "paid");
    assert_eq!(paid["balance_after_minor"], 1_000);
    assert_eq!(paid["already_settled"], false);

    let again = app
        .server
        .post("/api/v1/events/withdrawal-approved")
        .json(&body)
        .await
        .json::<Value>();
    assert_eq!(again["already_settled"], true);

    let summary = wallet(&app, "B").await;
    assert_eq!(summary.balance_minor, 1_000);
    assert_eq!(summary.total_withdrawn_minor, 2_000);
    assert_eq!(summary.total_earned_minor, 3_000);
}

#[tokio::test]
async fn test_run_operator_actions() {
    let app = spawn_app().await;
    let run_id = post_payment(&app, 10_000).await;

    // Posted runs can be neither cancelled nor retried
    app.server
        .post(&format!("/api/v1/runs/{run_id}/cancel"))
        .await
        .assert_status(StatusCode::CONFLICT);
    app.server
        .post(&format!("/api/v1/runs/{run_id}/retry"))
        .await
        .assert_status(StatusCode::CONFLICT);

    app.server
        .post(&format!("/api/v1/runs/{}/retry", Uuid::new_v4()))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let failed = app.server.get("/api/v1/runs/failed").await.json::<Vec<Value>>();
    assert!(failed.is_empty());
}

#[tokio::test]
async fn test_monthly_batch() {
    let app = spawn_app().await;
    post_payment(&app, 10_000).await;

    let report = app
        .server
        .post("/api/v1/batches/monthly")
        .json(&json!({ "year": 2024, "month": 2 }))
        .await;
    report.assert_status_ok();
    let report = report.json::<Value>();
    assert_eq!(report["payments_scanned"], 1);
    assert_eq!(report["already_posted"], 1);
    assert_eq!(report["enqueued"].as_array().unwrap().len(), 0);

    app.server
        .post("/api/v1/batches/monthly")
        .json(&json!({ "year": 2024, "month": 13 }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_agent_registration_guards_the_hierarchy() {
    let app = spawn_app().await;

    // C is the root of A -> B -> C; pointing it at A closes a loop
    app.server
        .put("/api/v1/agents/C")
        .json(&json!({ "name": "Agent C", "referrer_code": "A" }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let created = app
        .server
        .put("/api/v1/agents/d")
        .json(&json!({ "name": "Agent D", "referrer_code": "A" }))
        .await;
    created.assert_status_ok();
    assert_eq!(created.json::<Value>()["code"], "D");

    let downline = app
        .server
        .get("/api/v1/agents/A/downline")
        .await
        .json::<Vec<Value>>();
    assert_eq!(downline.len(), 1);
    assert_eq!(downline[0]["code"], "D");

    app.server
        .get("/api/v1/agents/ZZZ")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rule_table_endpoints() {
    let app = spawn_app().await;
    let rule = json!({
        "plan_id": "LIFE01",
        "tier_level": 1,
        "frequency": "monthly",
        "basis": { "type": "percentage", "percentage": "12" },
        "effective_from": TemporalFixtures::mid_february(),
    });

    // Overlaps the fixture tier 1 rule
    app.server
        .post("/api/v1/rules")
        .json(&rule)
        .await
        .assert_status(StatusCode::CONFLICT);

    let superseded = app.server.post("/api/v1/rules/supersede").json(&rule).await;
    superseded.assert_status(StatusCode::CREATED);
    assert_eq!(
        superseded.json::<Value>()["superseded"].as_array().unwrap().len(),
        1
    );

    let plan_rules = app
        .server
        .get("/api/v1/plans/LIFE01/rules")
        .await
        .json::<Vec<Value>>();
    assert_eq!(plan_rules.len(), 3);

    app.server
        .post("/api/v1/rules")
        .json(&json!({
            "plan_id": "LIFE01",
            "tier_level": 9,
            "frequency": "monthly",
            "basis": { "type": "fixed", "amount_minor": 500, "currency": "MYR" },
            "effective_from": TemporalFixtures::mid_february(),
        }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    // The ledger settles in MYR
    for path in ["/api/v1/rules", "/api/v1/rules/supersede"] {
        app.server
            .post(path)
            .json(&json!({
                "plan_id": "LIFE01",
                "tier_level": 3,
                "frequency": "monthly",
                "basis": { "type": "fixed", "amount_minor": 500, "currency": "USD" },
                "effective_from": TemporalFixtures::mid_february(),
            }))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let plan_rules = app
        .server
        .get("/api/v1/plans/LIFE01/rules")
        .await
        .json::<Vec<Value>>();
    assert_eq!(plan_rules.len(), 3);
}

#[tokio::test]
async fn test_adjustment_reversal_and_reconciliation() {
    let app = spawn_app().await;
    post_payment(&app, 10_000).await;

    app.server
        .post("/api/v1/agents/B/adjustments")
        .add_header("x-operator", "ops-1")
        .json(&json!({ "amount_minor": 250, "actor": "ops-1", "reason": "goodwill" }))
        .await
        .assert_status(StatusCode::CREATED);

    let item = app
        .server
        .get("/api/v1/agents/B/commissions")
        .await
        .json::<Vec<LineItemResponse>>()
        .remove(0);
    let reversal = app
        .server
        .post(&format!("/api/v1/line-items/{}/reverse", item.line_item_id))
        .json(&json!({ "actor": "ops-1", "reason": "policy cancelled" }))
        .await;
    reversal.assert_status_ok();
    assert_eq!(reversal.json::<Value>()["amount_minor"], -1_000);

    // Reversing twice is refused
    app.server
        .post(&format!("/api/v1/line-items/{}/reverse", item.line_item_id))
        .json(&json!({ "actor": "ops-1", "reason": "policy cancelled" }))
        .await
        .assert_status(StatusCode::CONFLICT);

    let report = app
        .server
        .get("/api/v1/agents/B/reconciliation")
        .await
        .json::<Value>();
    assert_eq!(report["consistent"], true);
    assert_eq!(report["ledger_sum_minor"], 250);
    assert_eq!(report["entry_count"], 3);
}
