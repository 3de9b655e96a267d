use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What every agent receives at the start of a cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisContext {
    pub cycle_id: Uuid,
    pub symbol: String,
    pub started_at: DateTime<Utc>,
    /// Market data snapshot from the shared cache, pre-fetched by the orchestrator.
    pub market_data: serde_json::Value,
}

impl AnalysisContext {
    pub fn new(symbol: impl Into<String>, market_data: serde_json::Value) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            symbol: symbol.into(),
            started_at: Utc::now(),
            market_data,
        }
    }
}
