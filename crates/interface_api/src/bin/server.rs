//! Agent Commission Core - API Server Binary
//!
//! Starts the HTTP API, the settlement worker pool and the Postgres
//! adapters behind them.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin commission-api
//!
//! # Run with environment variables
//! COMMISSION_DATABASE__URL=postgres://... COMMISSION_SERVER__PORT=8080 cargo run --bin commission-api
//! ```
//!
//! # Environment Variables
//!
//! * `COMMISSION_SERVER__HOST` / `COMMISSION_SERVER__PORT` - listener (default: 0.0.0.0:8080)
//! * `COMMISSION_DATABASE__URL` - PostgreSQL connection string
//! * `COMMISSION_DATABASE__RUN_MIGRATIONS` - apply migrations on startup (default: true)
//! * `COMMISSION_SETTLEMENT__WORKER_COUNT` - queue workers (default: 4)
//! * `COMMISSION_SETTLEMENT__BUSINESS_TIMEZONE` - calendar for monthly batches
//! * `COMMISSION_SETTLEMENT__PROCESSING_LEASE_SECS` - age at which a stuck run is failed (default: 900)
//! * `COMMISSION_LOG_LEVEL` - filter when `RUST_LOG` is unset (default: info)
//! * `COMMISSION_LOG_JSON` - JSON log lines (default: false)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::{Clock, HealthCheckable, SystemClock};
use domain_agent::{AgentPort, HierarchyResolver};
use domain_commission::{CommissionEngine, RuleTable};
use domain_settlement::{
    JobQueue, Orchestrator, SettlementQueries, SettlementService, WorkerPool,
};
use domain_wallet::WalletLedger;
use infra_db::{
    create_pool, run_migrations, PostgresAgentAdapter, PostgresCommissionRuleAdapter,
    PostgresSettlementStore,
};
use interface_api::{config::AppConfig, create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("invalid configuration")?;
    init_tracing(&config.log_level, config.log_json);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        workers = config.settlement.worker_count,
        currency = %config.settlement.currency,
        "Starting Agent Commission Core API Server"
    );

    let pool = create_pool(&config.database).await?;
    if config.database.run_migrations {
        run_migrations(&pool).await?;
    }

    let agents = Arc::new(PostgresAgentAdapter::new(pool.clone()));
    let rules = Arc::new(PostgresCommissionRuleAdapter::new(pool.clone()));
    let store = Arc::new(PostgresSettlementStore::new(
        pool.clone(),
        config.database.lock_timeout,
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let settlement = &config.settlement;
    let hierarchy = HierarchyResolver::new(agents.clone());
    let engine = CommissionEngine::new(hierarchy.clone(), RuleTable::new(rules.clone(), settlement.currency))
        .with_max_depth(settlement.max_upline_depth);
    let ledger = WalletLedger::new(settlement.currency).with_min_withdrawal(settlement.min_withdrawal_minor);
    let orchestrator = Arc::new(
        Orchestrator::new(store.clone(), store.clone(), store.clone(), engine, ledger, clock.clone())
            .with_retry_policy(settlement.retry_policy())
            .with_processing_lease(settlement.processing_lease())
            .with_timezone(settlement.business_timezone),
    );

    let (queue, receiver) = JobQueue::channel(settlement.queue_capacity);
    let workers = WorkerPool::start(orchestrator.clone(), receiver, settlement.worker_count);

    let agent_port: Arc<dyn AgentPort> = agents.clone();
    let health: Vec<Arc<dyn HealthCheckable>> = vec![
        agents as Arc<dyn HealthCheckable>,
        rules as Arc<dyn HealthCheckable>,
        store.clone() as Arc<dyn HealthCheckable>,
    ];
    let state = AppState {
        service: SettlementService::new(orchestrator, queue),
        queries: SettlementQueries::new(store.clone(), store, settlement.currency),
        agents: agent_port,
        hierarchy,
        clock,
        health,
    };
    let app = create_router(state);

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server_addr()))?;
    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and its queue sender) is gone, so the workers drain and exit
    workers.shutdown().await;
    pool.close().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// In-flight requests complete before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
