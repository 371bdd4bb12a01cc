use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::warn;

use crate::AppState;
use oracle_feed::{MarketDataSource, MarketSnapshot};

/// GET /price/gold - Current normalized gold market snapshot
pub async fn get_gold_price(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SnapshotResponse>, (StatusCode, String)> {
    match state.adapter.market_snapshot().await {
        Ok(snapshot) => Ok(Json(SnapshotResponse { snapshot })),
        Err(e) => {
            warn!("Gold snapshot error: {}", e);
            Err((StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
    }
}

/// GET /health - Service health check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now(),
    })
}

// Response types
#[derive(Debug, serde::Serialize)]
pub struct SnapshotResponse {
    #[serde(flatten)]
    pub snapshot: MarketSnapshot,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
