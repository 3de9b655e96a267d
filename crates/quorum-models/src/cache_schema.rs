use serde::{Deserialize, Serialize};

/// Categories for organizing cache keys.
/// External pipelines use these when writing to the shared SQLite cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    MarketData,
    Indicator,
    Sentiment,
    RiskMetric,
    AgentWeight,
}

impl CacheCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::MarketData => "market_data",
            CacheCategory::Indicator => "indicator",
            CacheCategory::Sentiment => "sentiment",
            CacheCategory::RiskMetric => "risk_metric",
            CacheCategory::AgentWeight => "agent_weight",
        }
    }
}

/// The SQLite table external pipelines write to and QUORUM reads from.
pub const CACHE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS cache_entries (
    key         TEXT PRIMARY KEY,
    category    TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    source      TEXT NOT NULL,
    symbol      TEXT,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_category ON cache_entries(category);
CREATE INDEX IF NOT EXISTS idx_cache_symbol ON cache_entries(symbol);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
";

/// Key pattern conventions for the cache.
///
/// - Quotes: `quote:{symbol}`
/// - Indicators: `indicator:{name}:{symbol}` (e.g., `indicator:rsi_14:AAPL`)
/// - Sentiment: `sentiment:{source}:{symbol}`
/// - Portfolio risk metrics: `risk:{metric}` with value `{"value": <number>}`
/// - Agent weights: `weight:{agent_id}` with value `{"value": <number>}`
pub mod key_patterns {
    pub const RISK_PREFIX: &str = "risk:";
    pub const WEIGHT_PREFIX: &str = "weight:";

    pub fn quote(symbol: &str) -> String {
        format!("quote:{symbol}")
    }

    pub fn indicator(name: &str, symbol: &str) -> String {
        format!("indicator:{name}:{symbol}")
    }

    pub fn sentiment(source: &str, symbol: &str) -> String {
        format!("sentiment:{source}:{symbol}")
    }

    pub fn risk_metric(metric: &str) -> String {
        format!("{RISK_PREFIX}{metric}")
    }

    pub fn agent_weight(agent_id: &str) -> String {
        format!("{WEIGHT_PREFIX}{agent_id}")
    }
}

/// A raw cache row as read from SQLite.
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub key: String,
    pub category: String,
    pub value_json: String,
    pub source: String,
    pub symbol: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub updated_at: String,
}
