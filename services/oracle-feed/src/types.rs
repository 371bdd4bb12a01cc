use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized market snapshot for the gold reference pair.
///
/// Immutable once constructed. When the upstream feed does not supply true
/// 24h statistics, `high_24h`/`low_24h`/`volatility_pct` are derived from
/// the feed's price and confidence interval, and `change_24h_pct` is the
/// deviation from the exponential-moving-average baseline rather than a
/// literal 24h-ago sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub current_price: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub change_24h_pct: f64,
    pub volatility_pct: f64,
    pub ema_price: f64,
    pub observed_at: DateTime<Utc>,
}

/// Raw price record as returned by an upstream feed source.
#[derive(Debug, Clone)]
pub struct PriceRecord {
    pub symbol: String,
    pub price: f64,
    /// Confidence interval in quote units, when the feed supplies one.
    pub confidence: Option<f64>,
    /// Smoothed price baseline, when the feed supplies one.
    pub ema_price: Option<f64>,
    pub publish_time: DateTime<Utc>,
}

/// Error types for oracle access
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("price feed unavailable: {0}")]
    Unavailable(String),

    #[error("invalid feed response: {0}")]
    InvalidResponse(String),

    #[error("no feed id for symbol: {0}")]
    UnknownSymbol(String),
}

/// Result type for oracle operations
pub type Result<T> = std::result::Result<T, OracleError>;

/// Trait for upstream price feed sources
#[async_trait::async_trait]
pub trait PriceFeedSource: Send + Sync {
    /// Fetch the latest signed price record for a symbol
    async fn latest(&self, symbol: &str) -> Result<PriceRecord>;

    /// Source name
    fn name(&self) -> &str;
}

/// Trait for anything that can produce a normalized market snapshot.
///
/// The trading side depends on this contract only, so tests can substitute
/// a fixed snapshot without standing up a feed.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn market_snapshot(&self) -> Result<MarketSnapshot>;
}
