//! Agent Runner - Autonomous gold trading agent
//!
//! 1. Accepts deposits and capability material over HTTP
//! 2. Sweeps pending deposits on a timer
//! 3. Feeds the price oracle into the decision engine
//! 4. Executes approve+buy atomically through the delegated session key
//! 5. Reconciles submissions whose finality was never observed

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use agent_runner::decision::{LlmAnalyst, MarketAnalyst, RuleAnalyst};
use agent_runner::deposit::DepositStore;
use agent_runner::ledger::HttpLedgerClient;
use agent_runner::store::CapabilityStore;
use agent_runner::{
    AgentRuntime, Config, DecisionEngine, InMemoryCapabilityStore, InMemoryDepositStore,
    SubmissionReconciler, SweepRunner, TradingAgent,
};
use oracle_feed::{OracleAdapter, PythClient};

/// Application state shared across handlers
pub struct AppState {
    pub deposits: Arc<dyn DepositStore>,
    pub capabilities: Arc<dyn CapabilityStore>,
    pub agent: Arc<TradingAgent>,
    pub stable_decimals: u8,
    pub gold_decimals: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting Agent Runner...");

    let config = Config::from_env()?;
    info!(
        "Ledger: {}, pool: {}, stable: {}, gold: {}",
        config.ledger_url,
        config.contracts.pool,
        config.contracts.stable_token.address,
        config.contracts.gold_token.address
    );

    // Ledger client
    let ledger = Arc::new(HttpLedgerClient::new(&config.ledger_url)?);

    // Stores (in-memory reference backends behind the store traits)
    let capabilities: Arc<dyn CapabilityStore> = Arc::new(InMemoryCapabilityStore::new());
    let deposits: Arc<dyn DepositStore> = Arc::new(InMemoryDepositStore::new());

    // Price oracle adapter with its short-lived cache
    let hermes = std::env::var("PYTH_HERMES_URL").ok();
    let pyth = match hermes {
        Some(url) => PythClient::with_base_url(&url),
        None => PythClient::new(),
    };
    let oracle = Arc::new(OracleAdapter::with_cache_ttl(
        Arc::new(pyth),
        "XAU",
        config.oracle_cache_ttl,
    ));
    info!("✓ Oracle adapter initialized for XAU/USD");

    // Decision engine: LLM analyst when configured, rule analyst otherwise
    let analyst: Arc<dyn MarketAnalyst> = match &config.llm {
        Some(llm) => {
            info!("✓ LLM analyst enabled ({})", llm.model);
            Arc::new(LlmAnalyst::new(&llm.endpoint, &llm.api_key, &llm.model)?)
        }
        None => {
            info!("✓ Rule analyst enabled (no LLM configured)");
            Arc::new(RuleAnalyst::new(config.thresholds))
        }
    };
    let engine = Arc::new(DecisionEngine::new(analyst, config.thresholds));

    // Execution core
    let agent = Arc::new(TradingAgent::new(
        ledger.clone(),
        capabilities.clone(),
        oracle,
        engine,
        config.contracts.clone(),
        config.confirm_timeout,
    ));

    // Sweep + reconcile loop
    let runtime = AgentRuntime {
        sweeper: Arc::new(SweepRunner::new(
            agent.clone(),
            deposits.clone(),
            config.contracts.stable_token.decimals,
            config.contracts.gold_token.decimals,
        )),
        reconciler: Arc::new(SubmissionReconciler::new(
            ledger,
            deposits.clone(),
            config.contracts.gold_token.address.clone(),
            config.contracts.gold_token.decimals,
        )),
        sweep_interval: config.sweep_interval,
        reconcile_interval: config.reconcile_interval,
    };
    tokio::spawn(runtime.run());

    // HTTP API
    let state = Arc::new(AppState {
        deposits,
        capabilities,
        agent,
        stable_decimals: config.contracts.stable_token.decimals,
        gold_decimals: config.contracts.gold_token.decimals,
    });

    let app = Router::new()
        .route("/deposits", post(handlers::create_deposit))
        .route("/deposits/:wallet", get(handlers::list_deposits))
        .route("/balances/:wallet", get(handlers::get_balances))
        .route(
            "/capabilities",
            get(handlers::list_capabilities).post(handlers::install_capability),
        )
        .route("/capabilities/:account", delete(handlers::revoke_capability))
        .route("/health", get(handlers::health_check))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("🚀 Agent Runner listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}

mod handlers;
