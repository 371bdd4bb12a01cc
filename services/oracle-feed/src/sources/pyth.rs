use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::types::{OracleError, PriceFeedSource, PriceRecord, Result};

const PYTH_HERMES_BASE: &str = "https://hermes.pyth.network";

/// Pyth price feed IDs for the metals this service quotes.
/// Full list: https://pyth.network/price-feeds
pub static PYTH_FEED_IDS: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "XAU" => "765d2ba906dbc32ca17cc11f5310a89e9ee1f6420508c63861f2f8ba4ee34bb2",
    "XAG" => "f2fb02c32b055c805e7238d628e5e9dadef274376114eb1f012337cabe93871e",
};

/// Hermes `latest_price_feeds` response entry
#[derive(Debug, Deserialize)]
struct PriceFeedEntry {
    id: String,
    price: Option<PriceData>,
    ema_price: Option<PriceData>,
}

#[derive(Debug, Deserialize)]
struct PriceData {
    price: String,
    conf: Option<String>,
    expo: i32,
    publish_time: i64,
}

impl PriceData {
    /// Pyth returns prices as integer + exponent, e.g. price="122500000",
    /// expo=-8 means $1.225.
    fn scaled_price(&self) -> Result<f64> {
        let raw: i64 = self
            .price
            .parse()
            .map_err(|_| OracleError::InvalidResponse(format!("bad price field: {}", self.price)))?;
        Ok(raw as f64 * 10f64.powi(self.expo))
    }

    fn scaled_conf(&self) -> Option<f64> {
        let raw: i64 = self.conf.as_ref()?.parse().ok()?;
        Some(raw as f64 * 10f64.powi(self.expo))
    }
}

/// Pyth Hermes client for signed price records
pub struct PythClient {
    client: Client,
    base_url: String,
}

impl PythClient {
    pub fn new() -> Self {
        Self::with_base_url(PYTH_HERMES_BASE)
    }

    /// Point the client at a different Hermes endpoint (tests, mirrors)
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check if symbol is supported
    pub fn supports_symbol(symbol: &str) -> bool {
        PYTH_FEED_IDS.contains_key(symbol)
    }

    fn publish_time(ts: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
    }
}

impl Default for PythClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PriceFeedSource for PythClient {
    async fn latest(&self, symbol: &str) -> Result<PriceRecord> {
        let feed_id = PYTH_FEED_IDS
            .get(symbol)
            .ok_or_else(|| OracleError::UnknownSymbol(symbol.to_string()))?;

        let url = format!(
            "{}/api/latest_price_feeds?ids[]=0x{}",
            self.base_url, feed_id
        );

        debug!("Fetching Pyth price for {} from {}", symbol, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(format!("Pyth request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::Unavailable(format!(
                "Pyth API error: {} - {}",
                status, text
            )));
        }

        let feeds: Vec<PriceFeedEntry> = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(format!("Pyth response parse: {}", e)))?;

        let entry = feeds
            .into_iter()
            .next()
            .ok_or_else(|| OracleError::Unavailable("no price record in Pyth response".into()))?;

        // The primary price field is mandatory; ema/conf are optional and
        // tolerated when absent.
        let price_data = entry
            .price
            .ok_or_else(|| OracleError::InvalidResponse(format!("feed {} has no price", entry.id)))?;

        let price = price_data.scaled_price()?;
        if price <= 0.0 {
            return Err(OracleError::InvalidResponse(format!(
                "non-positive price for {}: {}",
                symbol, price
            )));
        }

        let confidence = price_data.scaled_conf();
        let ema_price = entry.ema_price.and_then(|e| e.scaled_price().ok());

        info!(
            "Pyth price for {}: ${:.4} (conf: {:?})",
            symbol, price, confidence
        );

        Ok(PriceRecord {
            symbol: symbol.to_string(),
            price,
            confidence,
            ema_price,
            publish_time: Self::publish_time(price_data.publish_time),
        })
    }

    fn name(&self) -> &str {
        "pyth"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_supports_symbol() {
        assert!(PythClient::supports_symbol("XAU"));
        assert!(PythClient::supports_symbol("XAG"));
        assert!(!PythClient::supports_symbol("FAKE"));
    }

    #[test]
    fn test_exponent_scaling() {
        let data = PriceData {
            price: "122500000".to_string(),
            conf: Some("24500".to_string()),
            expo: -8,
            publish_time: 0,
        };
        assert!((data.scaled_price().unwrap() - 1.225).abs() < 1e-9);
        assert!((data.scaled_conf().unwrap() - 0.000245).abs() < 1e-9);
    }

    fn xau_feed_id() -> &'static str {
        PYTH_FEED_IDS.get("XAU").copied().unwrap()
    }

    fn feed_body(price: &str, conf: Option<&str>, ema: Option<&str>) -> serde_json::Value {
        let mut entry = serde_json::json!({
            "id": xau_feed_id(),
            "price": { "price": price, "expo": -8, "publish_time": 1722470400 },
        });
        if let Some(c) = conf {
            entry["price"]["conf"] = serde_json::json!(c);
        }
        if let Some(e) = ema {
            entry["ema_price"] = serde_json::json!({
                "price": e, "expo": -8, "publish_time": 1722470400
            });
        }
        serde_json::json!([entry])
    }

    #[tokio::test]
    async fn test_latest_parses_full_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/latest_price_feeds"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(feed_body("240000000000", Some("72000000"), Some("239500000000"))),
            )
            .mount(&server)
            .await;

        let client = PythClient::with_base_url(&server.uri());
        let record = client.latest("XAU").await.unwrap();

        assert!((record.price - 2400.0).abs() < 1e-6);
        assert!((record.confidence.unwrap() - 0.72).abs() < 1e-6);
        assert!((record.ema_price.unwrap() - 2395.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_latest_tolerates_missing_optionals() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/latest_price_feeds"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(feed_body("240000000000", None, None)),
            )
            .mount(&server)
            .await;

        let client = PythClient::with_base_url(&server.uri());
        let record = client.latest("XAU").await.unwrap();

        assert!((record.price - 2400.0).abs() < 1e-6);
        assert!(record.confidence.is_none());
        assert!(record.ema_price.is_none());
    }

    #[tokio::test]
    async fn test_latest_rejects_missing_price() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/latest_price_feeds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": xau_feed_id() }
            ])))
            .mount(&server)
            .await;

        let client = PythClient::with_base_url(&server.uri());
        let err = client.latest("XAU").await.unwrap_err();
        assert!(matches!(err, OracleError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_latest_empty_response_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/latest_price_feeds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = PythClient::with_base_url(&server.uri());
        let err = client.latest("XAU").await.unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }
}
