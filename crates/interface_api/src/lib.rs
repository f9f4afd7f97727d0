//! HTTP API Layer
//!
//! This crate exposes the commission core over REST using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: payment and withdrawal events, wallet queries, operator
//!   actions on runs, withdrawals and the rule table
//! - **Middleware**: tracing, request ids and audit logging of writes
//! - **DTOs**: request/response bodies with amounts in minor units
//! - **Error Handling**: domain errors mapped to consistent JSON responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use core_kernel::{Clock, HealthCheckable};
use domain_agent::{AgentPort, HierarchyResolver};
use domain_commission::RuleTable;
use domain_settlement::{SettlementQueries, SettlementService};

use crate::handlers::{agents, events, health, rules, runs, withdrawals};
use crate::middleware::audit_middleware;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: SettlementService,
    pub queries: SettlementQueries,
    pub agents: Arc<dyn AgentPort>,
    pub hierarchy: HierarchyResolver,
    pub clock: Arc<dyn Clock>,
    /// Adapters probed by `/health/ready`
    pub health: Vec<Arc<dyn HealthCheckable>>,
}

impl AppState {
    pub fn rules(&self) -> &RuleTable {
        self.service.orchestrator().engine().rules()
    }
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let event_routes = Router::new()
        .route("/payment-completed", post(events::payment_completed))
        .route("/withdrawal-approved", post(events::withdrawal_approved));

    let agent_routes = Router::new()
        .route("/:code", get(agents::get_agent).put(agents::upsert_agent))
        .route("/:code/downline", get(agents::get_downline))
        .route("/:code/wallet", get(agents::get_wallet))
        .route("/:code/commissions", get(agents::get_commissions))
        .route("/:code/withdrawals", post(agents::request_withdrawal))
        .route("/:code/adjustments", post(agents::adjust_wallet))
        .route("/:code/reconciliation", get(agents::reconcile_wallet));

    let run_routes = Router::new()
        .route("/failed", get(runs::failed_runs))
        .route("/:id", get(runs::get_run))
        .route("/:id/retry", post(runs::retry_run))
        .route("/:id/cancel", post(runs::cancel_run));

    let rule_routes = Router::new()
        .route("/", post(rules::create_rule))
        .route("/supersede", post(rules::supersede_rule))
        .route("/:id/activate", post(rules::activate_rule))
        .route("/:id/deactivate", post(rules::deactivate_rule));

    let api_routes = Router::new()
        .nest("/events", event_routes)
        .nest("/agents", agent_routes)
        .nest("/runs", run_routes)
        .nest("/rules", rule_routes)
        .route("/plans/:plan_id/rules", get(rules::plan_rules))
        .route("/batches/monthly", post(runs::monthly_batch))
        .route("/withdrawals/:id/reject", post(withdrawals::reject_withdrawal))
        .route("/line-items/:id/reverse", post(withdrawals::reverse_line_item))
        .layer(axum_middleware::from_fn(audit_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
