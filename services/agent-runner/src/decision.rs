//! Market decision engine
//!
//! Turns a market snapshot plus a deposit amount into a BUY-or-WAIT
//! decision. The primary analyst is pluggable (rule-based scoring, or an
//! LLM behind the same trait); any analyst failure degrades to a
//! deterministic price-vs-EMA fallback so a malformed external response
//! can never leave a deposit stuck.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use oracle_feed::MarketSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Wait,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Wait => write!(f, "WAIT"),
        }
    }
}

/// Advisory decision attached to the deposit it was computed for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDecision {
    pub action: TradeAction,
    /// 0-100; gates execution but carries no other control flow
    pub confidence: u8,
    pub reasoning: String,
    pub current_price: f64,
    pub price_target: f64,
    pub decided_at: DateTime<Utc>,
}

/// Error types for the primary decision path
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("analyst unavailable: {0}")]
    Unavailable(String),

    #[error("unparseable analyst output: {0}")]
    Parse(String),
}

#[async_trait]
pub trait MarketAnalyst: Send + Sync {
    async fn analyze(
        &self,
        snapshot: &MarketSnapshot,
        deposit_amount: Decimal,
    ) -> Result<TradeDecision, DecisionError>;

    fn name(&self) -> &str;
}

/// Tunable decision parameters. These are product heuristics, not
/// invariants; the defaults mirror the reference values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecisionThresholds {
    /// BUY signal: price within this % of the 24h low
    #[serde(default = "default_near_low_pct")]
    pub near_low_pct: f64,
    /// BUY signal: price dropped more than this % below the EMA
    #[serde(default = "default_ema_dip_pct")]
    pub ema_dip_pct: f64,
    /// BUY signal: volatility above this % reads as a reversal setup
    #[serde(default = "default_volatility_floor_pct")]
    pub volatility_floor_pct: f64,
    /// The agent only executes BUY decisions at or above this confidence
    #[serde(default = "default_min_confidence")]
    pub min_confidence: u8,
    /// Fallback rule: BUY iff price < EMA * this factor
    #[serde(default = "default_fallback_ema_discount")]
    pub fallback_ema_discount: f64,
    /// Fixed confidence reported by the fallback rule
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: u8,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            near_low_pct: default_near_low_pct(),
            ema_dip_pct: default_ema_dip_pct(),
            volatility_floor_pct: default_volatility_floor_pct(),
            min_confidence: default_min_confidence(),
            fallback_ema_discount: default_fallback_ema_discount(),
            fallback_confidence: default_fallback_confidence(),
        }
    }
}

fn default_near_low_pct() -> f64 {
    0.5
}
fn default_ema_dip_pct() -> f64 {
    1.0
}
fn default_volatility_floor_pct() -> f64 {
    0.3
}
fn default_min_confidence() -> u8 {
    70
}
fn default_fallback_ema_discount() -> f64 {
    0.995
}
fn default_fallback_confidence() -> u8 {
    60
}

/// Deterministic dip/reversal scorer — the default primary analyst.
pub struct RuleAnalyst {
    thresholds: DecisionThresholds,
}

impl RuleAnalyst {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self { thresholds }
    }
}

#[async_trait]
impl MarketAnalyst for RuleAnalyst {
    async fn analyze(
        &self,
        snapshot: &MarketSnapshot,
        _deposit_amount: Decimal,
    ) -> Result<TradeDecision, DecisionError> {
        let t = &self.thresholds;
        let price = snapshot.current_price;

        let near_low = price <= snapshot.low_24h * (1.0 + t.near_low_pct / 100.0);
        let ema_dip = price < snapshot.ema_price * (1.0 - t.ema_dip_pct / 100.0);
        let volatile = snapshot.volatility_pct > t.volatility_floor_pct;

        let mut signals = Vec::new();
        if near_low {
            signals.push(format!(
                "price within {:.1}% of the 24h low",
                t.near_low_pct
            ));
        }
        if ema_dip {
            signals.push(format!(
                "price more than {:.1}% below the EMA",
                t.ema_dip_pct
            ));
        }
        if volatile {
            signals.push(format!(
                "volatility {:.2}% suggests a reversal setup",
                snapshot.volatility_pct
            ));
        }

        let decision = if signals.is_empty() {
            TradeDecision {
                action: TradeAction::Wait,
                confidence: 55,
                reasoning: format!(
                    "No entry advantage: price ${:.2} holds {:+.2}% against the EMA with volatility {:.2}%",
                    price, snapshot.change_24h_pct, snapshot.volatility_pct
                ),
                current_price: price,
                price_target: snapshot.low_24h,
                decided_at: Utc::now(),
            }
        } else {
            let mut confidence = 55u8;
            if near_low {
                confidence += 20;
            }
            if ema_dip {
                confidence += 15;
            }
            if volatile {
                confidence += 10;
            }

            TradeDecision {
                action: TradeAction::Buy,
                confidence: confidence.min(95),
                reasoning: format!("Dip entry: {}", signals.join("; ")),
                current_price: price,
                price_target: price,
                decided_at: Utc::now(),
            }
        };

        Ok(decision)
    }

    fn name(&self) -> &str {
        "rule"
    }
}

/// LLM-backed analyst talking to a chat-completions endpoint. The model's
/// reply is scraped for its first JSON object; anything else is a parse
/// error that the engine absorbs into the fallback.
pub struct LlmAnalyst {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// The JSON shape the model is instructed to reply with.
#[derive(Debug, Deserialize)]
struct LlmVerdict {
    action: String,
    confidence: f64,
    reasoning: String,
    #[serde(default, rename = "priceTarget")]
    price_target: Option<f64>,
}

impl LlmAnalyst {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn prompt(snapshot: &MarketSnapshot, deposit_amount: Decimal) -> String {
        format!(
            "You are a gold trading analyst. Decide whether to BUY gold now or WAIT \
             for a better entry.\n\
             Current price: ${:.2}\n24h high: ${:.2}\n24h low: ${:.2}\n\
             24h change: {:.2}%\nVolatility: {:.2}%\nEMA price: ${:.2}\n\
             Deposit amount: {}\n\
             Reply ONLY with JSON: {{\"action\": \"BUY\" or \"WAIT\", \
             \"confidence\": 0-100, \"reasoning\": \"...\", \"priceTarget\": number}}",
            snapshot.current_price,
            snapshot.high_24h,
            snapshot.low_24h,
            snapshot.change_24h_pct,
            snapshot.volatility_pct,
            snapshot.ema_price,
            deposit_amount,
        )
    }
}

/// Extract the first JSON object embedded in free-form model output.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse scraped model output into a decision.
fn parse_verdict(text: &str, snapshot: &MarketSnapshot) -> Result<TradeDecision, DecisionError> {
    let json = extract_json_object(text)
        .ok_or_else(|| DecisionError::Parse("no JSON object in analyst output".into()))?;

    let verdict: LlmVerdict =
        serde_json::from_str(json).map_err(|e| DecisionError::Parse(e.to_string()))?;

    let action = match verdict.action.trim().to_uppercase().as_str() {
        "BUY" => TradeAction::Buy,
        "WAIT" => TradeAction::Wait,
        other => {
            return Err(DecisionError::Parse(format!(
                "unknown action: {}",
                other
            )))
        }
    };

    Ok(TradeDecision {
        action,
        confidence: verdict.confidence.clamp(0.0, 100.0).round() as u8,
        reasoning: verdict.reasoning,
        current_price: snapshot.current_price,
        price_target: verdict.price_target.unwrap_or(snapshot.low_24h),
        decided_at: Utc::now(),
    })
}

#[async_trait]
impl MarketAnalyst for LlmAnalyst {
    async fn analyze(
        &self,
        snapshot: &MarketSnapshot,
        deposit_amount: Decimal,
    ) -> Result<TradeDecision, DecisionError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": Self::prompt(snapshot, deposit_amount),
            }],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DecisionError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DecisionError::Unavailable(format!(
                "analyst endpoint returned {}",
                response.status()
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| DecisionError::Parse(e.to_string()))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| DecisionError::Parse("empty choices in analyst response".into()))?;

        parse_verdict(content, snapshot)
    }

    fn name(&self) -> &str {
        "llm"
    }
}

/// Decision engine: primary analyst plus deterministic fallback.
pub struct DecisionEngine {
    analyst: Arc<dyn MarketAnalyst>,
    thresholds: DecisionThresholds,
}

impl DecisionEngine {
    pub fn new(analyst: Arc<dyn MarketAnalyst>, thresholds: DecisionThresholds) -> Self {
        Self {
            analyst,
            thresholds,
        }
    }

    /// Pure fallback rule: BUY iff price sits below the discounted EMA.
    pub fn fallback(&self, snapshot: &MarketSnapshot) -> TradeDecision {
        let t = &self.thresholds;
        let action = if snapshot.current_price < snapshot.ema_price * t.fallback_ema_discount {
            TradeAction::Buy
        } else {
            TradeAction::Wait
        };

        TradeDecision {
            action,
            confidence: t.fallback_confidence,
            reasoning: "Fallback: price-vs-EMA rule (analyst unavailable)".to_string(),
            current_price: snapshot.current_price,
            price_target: snapshot.low_24h,
            decided_at: Utc::now(),
        }
    }

    /// Never fails: analyst errors are absorbed into the fallback rule.
    pub async fn decide(&self, snapshot: &MarketSnapshot, deposit_amount: Decimal) -> TradeDecision {
        match self.analyst.analyze(snapshot, deposit_amount).await {
            Ok(mut decision) => {
                decision.confidence = decision.confidence.min(100);
                decision
            }
            Err(e) => {
                warn!(
                    "Analyst '{}' failed ({}); using deterministic fallback",
                    self.analyst.name(),
                    e
                );
                self.fallback(snapshot)
            }
        }
    }

    /// The agent acts on BUY only at or above the configured confidence.
    pub fn meets_execution_threshold(&self, decision: &TradeDecision) -> bool {
        decision.action == TradeAction::Buy && decision.confidence >= self.thresholds.min_confidence
    }

    pub fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(current: f64, low: f64, high: f64, ema: f64, volatility: f64) -> MarketSnapshot {
        MarketSnapshot {
            current_price: current,
            high_24h: high,
            low_24h: low,
            change_24h_pct: (current - ema) / ema * 100.0,
            volatility_pct: volatility,
            ema_price: ema,
            observed_at: Utc::now(),
        }
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(
            Arc::new(RuleAnalyst::new(DecisionThresholds::default())),
            DecisionThresholds::default(),
        )
    }

    struct FailingAnalyst;

    #[async_trait]
    impl MarketAnalyst for FailingAnalyst {
        async fn analyze(
            &self,
            _snapshot: &MarketSnapshot,
            _deposit_amount: Decimal,
        ) -> Result<TradeDecision, DecisionError> {
            Err(DecisionError::Parse("garbage output".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_price_at_low_is_buy_above_threshold() {
        let engine = engine();
        // Price sits exactly on the 24h low, otherwise neutral.
        let snap = snapshot(2352.0, 2352.0, 2448.0, 2352.0, 0.1);

        let decision = engine.decide(&snap, Decimal::from(1_000_000)).await;
        assert_eq!(decision.action, TradeAction::Buy);
        assert!(decision.confidence >= 70);
        assert!(engine.meets_execution_threshold(&decision));
    }

    #[tokio::test]
    async fn test_price_at_high_low_volatility_is_wait() {
        let engine = engine();
        let snap = snapshot(2448.0, 2352.0, 2448.0, 2400.0, 0.1);

        let decision = engine.decide(&snap, Decimal::from(100)).await;
        assert_eq!(decision.action, TradeAction::Wait);
        assert!(!engine.meets_execution_threshold(&decision));
    }

    #[tokio::test]
    async fn test_ema_dip_triggers_buy() {
        let engine = engine();
        // 2% below the EMA but well above the synthetic low.
        let snap = snapshot(2400.0, 2352.0 - 100.0, 2448.0, 2450.0, 0.1);

        let decision = engine.decide(&snap, Decimal::from(100)).await;
        assert_eq!(decision.action, TradeAction::Buy);
        assert!(decision.confidence >= 70);
    }

    #[tokio::test]
    async fn test_volatility_alone_is_buy_below_threshold() {
        let engine = engine();
        let snap = snapshot(2400.0, 2300.0, 2448.0, 2400.0, 0.5);

        let decision = engine.decide(&snap, Decimal::from(100)).await;
        assert_eq!(decision.action, TradeAction::Buy);
        // Advisory dip signal, but not strong enough to execute on.
        assert!(!engine.meets_execution_threshold(&decision));
    }

    #[tokio::test]
    async fn test_failing_analyst_degrades_to_fallback() {
        let engine = DecisionEngine::new(Arc::new(FailingAnalyst), DecisionThresholds::default());

        // Below EMA * 0.995 -> fallback says BUY at fixed confidence.
        let dip = snapshot(2380.0, 2350.0, 2448.0, 2400.0, 0.1);
        let decision = engine.decide(&dip, Decimal::from(100)).await;
        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.confidence, 60);

        // Above the discounted EMA -> WAIT.
        let flat = snapshot(2400.0, 2350.0, 2448.0, 2400.0, 0.1);
        let decision = engine.decide(&flat, Decimal::from(100)).await;
        assert_eq!(decision.action, TradeAction::Wait);
    }

    #[test]
    fn test_extract_json_object() {
        let wrapped = "Sure! Here is my analysis:\n{\"action\": \"BUY\"} thanks";
        assert_eq!(extract_json_object(wrapped), Some("{\"action\": \"BUY\"}"));
        assert!(extract_json_object("no json here").is_none());
    }

    #[test]
    fn test_parse_verdict_accepts_wrapped_json() {
        let snap = snapshot(2400.0, 2352.0, 2448.0, 2400.0, 0.1);
        let text = "Analysis follows.\n{\"action\": \"buy\", \"confidence\": 82.4, \
                    \"reasoning\": \"dip\", \"priceTarget\": 2390.0}";

        let decision = parse_verdict(text, &snap).unwrap();
        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.confidence, 82);
        assert_eq!(decision.price_target, 2390.0);
    }

    #[test]
    fn test_parse_verdict_rejects_unknown_action() {
        let snap = snapshot(2400.0, 2352.0, 2448.0, 2400.0, 0.1);
        let text = "{\"action\": \"HODL\", \"confidence\": 90, \"reasoning\": \"vibes\"}";
        assert!(matches!(
            parse_verdict(text, &snap),
            Err(DecisionError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_verdict_clamps_confidence() {
        let snap = snapshot(2400.0, 2352.0, 2448.0, 2400.0, 0.1);
        let text = "{\"action\": \"WAIT\", \"confidence\": 140, \"reasoning\": \"calm\"}";
        let decision = parse_verdict(text, &snap).unwrap();
        assert_eq!(decision.confidence, 100);
        // Missing priceTarget falls back to the 24h low.
        assert_eq!(decision.price_target, snap.low_24h);
    }
}
