pub mod types;
pub mod sources {
    pub mod pyth;
}

pub use sources::pyth::PythClient;
pub use types::*;

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// How long a fetched snapshot stays valid before a refetch is forced
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Spread applied around the spot price when the feed carries no true 24h
/// statistics (documented approximation, not a bug).
const SYNTHETIC_RANGE_PCT: f64 = 2.0;

#[derive(Clone)]
struct CachedSnapshot {
    fetched_at: Instant,
    snapshot: MarketSnapshot,
}

/// Price Oracle Adapter: normalizes a raw feed record into a
/// [`MarketSnapshot`] and bounds upstream call rate with a short-lived
/// cache. A fetch younger than the TTL is returned unchanged; anything
/// older forces a refetch.
pub struct OracleAdapter {
    source: Arc<dyn PriceFeedSource>,
    symbol: String,
    cache_ttl: Duration,
    cache: RwLock<Option<CachedSnapshot>>,
}

impl OracleAdapter {
    pub fn new(source: Arc<dyn PriceFeedSource>, symbol: &str) -> Self {
        Self::with_cache_ttl(source, symbol, DEFAULT_CACHE_TTL)
    }

    pub fn with_cache_ttl(source: Arc<dyn PriceFeedSource>, symbol: &str, ttl: Duration) -> Self {
        Self {
            source,
            symbol: symbol.to_string(),
            cache_ttl: ttl,
            cache: RwLock::new(None),
        }
    }

    async fn fetch_and_cache(&self) -> Result<MarketSnapshot> {
        let record = self.source.latest(&self.symbol).await?;
        let snapshot = derive_snapshot(&record);

        let mut cache = self.cache.write().await;
        *cache = Some(CachedSnapshot {
            fetched_at: Instant::now(),
            snapshot: snapshot.clone(),
        });

        Ok(snapshot)
    }
}

#[async_trait::async_trait]
impl MarketDataSource for OracleAdapter {
    async fn market_snapshot(&self) -> Result<MarketSnapshot> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.cache_ttl {
                    debug!(
                        "Serving cached {} snapshot ({:?} old)",
                        self.symbol,
                        cached.fetched_at.elapsed()
                    );
                    return Ok(cached.snapshot.clone());
                }
            }
        }

        self.fetch_and_cache().await
    }
}

/// Normalize a raw feed record into a market snapshot.
///
/// The upstream feed retains no historical ticks, so the 24h range is
/// synthesized from the spot price, volatility from the confidence
/// interval, and the 24h change from the deviation against the EMA
/// baseline. A feed that does carry real statistics can replace these
/// derivations as long as `change_24h_pct` stays relative to a smoothed
/// baseline.
pub fn derive_snapshot(record: &PriceRecord) -> MarketSnapshot {
    let price = record.price;
    let ema = record.ema_price.unwrap_or(price);
    let conf = record.confidence.unwrap_or(0.0);

    let range = SYNTHETIC_RANGE_PCT / 100.0;
    let change_24h_pct = if ema > 0.0 {
        (price - ema) / ema * 100.0
    } else {
        0.0
    };

    MarketSnapshot {
        current_price: price,
        high_24h: price * (1.0 + range),
        low_24h: price * (1.0 - range),
        change_24h_pct,
        volatility_pct: if price > 0.0 { conf / price * 100.0 } else { 0.0 },
        ema_price: ema,
        observed_at: Utc::now(),
    }
}
