//! Agent runner configuration

use std::time::Duration;

use crate::address::Address;
use crate::amount::TokenInfo;
use crate::decision::DecisionThresholds;

/// Contract addresses the agent is allowed to touch.
#[derive(Debug, Clone)]
pub struct Contracts {
    pub pool: Address,
    pub stable_token: TokenInfo,
    pub gold_token: TokenInfo,
}

/// LLM analyst settings; absent means the rule-based analyst runs.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

/// Configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    pub ledger_url: String,
    pub port: u16,
    pub sweep_interval: Duration,
    pub reconcile_interval: Duration,
    /// Bound on awaiting finality of a submitted operation
    pub confirm_timeout: Duration,
    /// Default session key lifetime offered at issuance
    pub session_ttl_secs: i64,
    pub oracle_cache_ttl: Duration,
    pub contracts: Contracts,
    pub thresholds: DecisionThresholds,
    pub llm: Option<LlmConfig>,
}

const DEFAULT_POOL: &str = "0x475f5c184d23d5839123e7cdb23273ef0470c018";
const DEFAULT_STABLE: &str = "0x53b8e9e6513a2e7a4d23f8f9bfe3f5985c9788e4";
const DEFAULT_GOLD: &str = "0x6830999d9173b235df6ac8c9068c4235fd58f532";

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let pool: Address = env_or("POOL_ADDRESS", DEFAULT_POOL)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid POOL_ADDRESS: {}", e))?;
        let stable: Address = env_or("STABLE_TOKEN_ADDRESS", DEFAULT_STABLE)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid STABLE_TOKEN_ADDRESS: {}", e))?;
        let gold: Address = env_or("GOLD_TOKEN_ADDRESS", DEFAULT_GOLD)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid GOLD_TOKEN_ADDRESS: {}", e))?;

        let llm = match std::env::var("LLM_API_KEY") {
            Ok(api_key) if !api_key.is_empty() => Some(LlmConfig {
                endpoint: env_or("LLM_ENDPOINT", "https://api.openai.com/v1"),
                api_key,
                model: env_or("LLM_MODEL", "gpt-4o-mini"),
            }),
            _ => None,
        };

        Ok(Self {
            ledger_url: env_or("LEDGER_URL", "http://localhost:8545"),
            port: env_parse("PORT", 8080),
            sweep_interval: Duration::from_secs(env_parse("SWEEP_INTERVAL_SECS", 60)),
            reconcile_interval: Duration::from_secs(env_parse("RECONCILE_INTERVAL_SECS", 300)),
            confirm_timeout: Duration::from_secs(env_parse("CONFIRM_TIMEOUT_SECS", 60)),
            session_ttl_secs: env_parse("SESSION_TTL_SECS", 7 * 24 * 60 * 60),
            oracle_cache_ttl: Duration::from_secs(env_parse("SNAPSHOT_CACHE_SECS", 60)),
            contracts: Contracts {
                pool,
                stable_token: TokenInfo {
                    address: stable,
                    symbol: "USDC".to_string(),
                    decimals: 6,
                },
                gold_token: TokenInfo {
                    address: gold,
                    symbol: "GOLD".to_string(),
                    decimals: 18,
                },
            },
            thresholds: DecisionThresholds {
                min_confidence: env_parse("MIN_CONFIDENCE", 70),
                ..DecisionThresholds::default()
            },
            llm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_contracts_parse() {
        let config = Config::from_env().unwrap();
        assert_eq!(config.contracts.stable_token.decimals, 6);
        assert_eq!(config.contracts.gold_token.decimals, 18);
        assert_eq!(config.thresholds.min_confidence, 70);
    }
}
