use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use oracle_feed::{OracleAdapter, PythClient};

/// Application state shared across handlers
pub struct AppState {
    pub adapter: Arc<OracleAdapter>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting Oracle Feed Service...");

    // Initialize Pyth client for the gold reference pair
    let hermes_url = std::env::var("PYTH_HERMES_URL").ok();
    let pyth = match hermes_url {
        Some(url) => PythClient::with_base_url(&url),
        None => PythClient::new(),
    };
    info!("✓ Pyth client initialized for XAU/USD");

    let cache_ttl = std::env::var("SNAPSHOT_CACHE_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);

    let adapter = Arc::new(OracleAdapter::with_cache_ttl(
        Arc::new(pyth),
        "XAU",
        std::time::Duration::from_secs(cache_ttl),
    ));

    let state = Arc::new(AppState { adapter });

    // Build router
    let app = Router::new()
        .route("/price/gold", get(handlers::get_gold_price))
        .route("/health", get(handlers::health_check))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8081);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("🚀 Oracle Feed Service listening on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

mod handlers;
