use std::sync::Arc;

use async_trait::async_trait;
use quorum_cache::CacheReader;
use quorum_engine::EngineError;
use quorum_models::{AnalysisContext, RiskMetrics, WeightTable};
use tracing::debug;

use crate::error::AgentError;

/// Portfolio collaborator. An error means the data is unavailable, which
/// the engine treats as maximum risk.
#[async_trait]
pub trait RiskMetricsSource: Send + Sync {
    async fn current_risk_metrics(&self) -> Result<RiskMetrics, AgentError>;
}

/// Supplies the weight table for one cycle. Adaptive weighting plugs in here.
#[async_trait]
pub trait WeightSource: Send + Sync {
    async fn weights_for(&self, context: &AnalysisContext) -> Result<WeightTable, AgentError>;
}

/// Fixed weights, typically from `[weights]` in the config file.
pub struct StaticWeights {
    table: WeightTable,
}

impl StaticWeights {
    pub fn new(table: WeightTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl WeightSource for StaticWeights {
    async fn weights_for(&self, _context: &AnalysisContext) -> Result<WeightTable, AgentError> {
        Ok(self.table.clone())
    }
}

/// `weight:{agent_id}` rows from the shared cache laid over a base table.
pub struct CachedWeights {
    cache: Arc<CacheReader>,
    base: WeightTable,
}

impl CachedWeights {
    pub fn new(cache: Arc<CacheReader>, base: WeightTable) -> Self {
        Self { cache, base }
    }
}

#[async_trait]
impl WeightSource for CachedWeights {
    async fn weights_for(&self, context: &AnalysisContext) -> Result<WeightTable, AgentError> {
        let overrides = self.cache.agent_weights()?;
        debug!(cycle = %context.cycle_id, overrides = overrides.len(), "Loaded cached agent weights");
        let table = overrides
            .into_iter()
            .try_fold(self.base.clone(), |table, (agent_id, weight)| {
                table.with_weight(agent_id, weight)
            })
            .map_err(EngineError::from)?;
        Ok(table)
    }
}

/// Fixed metrics, for replayed cycles and tests.
pub struct StaticRiskMetrics {
    metrics: RiskMetrics,
}

impl StaticRiskMetrics {
    pub fn new(metrics: RiskMetrics) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl RiskMetricsSource for StaticRiskMetrics {
    async fn current_risk_metrics(&self) -> Result<RiskMetrics, AgentError> {
        Ok(self.metrics.clone())
    }
}

/// `risk:{metric}` rows from the shared cache.
///
/// No live rows is reported as unavailable, never as an empty (risk-free)
/// portfolio.
pub struct CachedRiskMetrics {
    cache: Arc<CacheReader>,
}

impl CachedRiskMetrics {
    pub fn new(cache: Arc<CacheReader>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl RiskMetricsSource for CachedRiskMetrics {
    async fn current_risk_metrics(&self) -> Result<RiskMetrics, AgentError> {
        let metrics = self.cache.risk_metrics()?;
        if metrics.is_empty() {
            return Err(AgentError::Unavailable(
                "no live risk metrics in cache".to_string(),
            ));
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use quorum_cache::SqliteReader;
    use quorum_models::cache_schema::key_patterns;
    use quorum_models::{CacheCategory, CacheRow};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn scalar_row(key: String, category: CacheCategory, value: &str) -> CacheRow {
        let now = Utc::now();
        CacheRow {
            key,
            category: category.as_str().to_string(),
            value_json: format!(r#"{{"value": {value}}}"#),
            source: "test".to_string(),
            symbol: None,
            created_at: now.to_rfc3339(),
            expires_at: (now + ChronoDuration::minutes(5)).to_rfc3339(),
            updated_at: now.to_rfc3339(),
        }
    }

    fn cache(rows: &[CacheRow]) -> Arc<CacheReader> {
        let db = SqliteReader::open_in_memory().unwrap();
        for row in rows {
            db.insert(row).unwrap();
        }
        Arc::new(CacheReader::new(db, 100, Duration::from_secs(60)))
    }

    fn context() -> AnalysisContext {
        AnalysisContext::new("AAPL", serde_json::json!({}))
    }

    #[tokio::test]
    async fn static_weights_are_returned_as_is() {
        let source = StaticWeights::new(WeightTable::default());
        assert_eq!(
            source.weights_for(&context()).await.unwrap(),
            WeightTable::default()
        );
    }

    #[tokio::test]
    async fn cached_weights_override_base() {
        let cache = cache(&[
            scalar_row(
                key_patterns::agent_weight("technical"),
                CacheCategory::AgentWeight,
                "0.8",
            ),
            scalar_row(
                key_patterns::agent_weight("macro"),
                CacheCategory::AgentWeight,
                "0.1",
            ),
        ]);
        let source = CachedWeights::new(cache, WeightTable::default());
        let table = source.weights_for(&context()).await.unwrap();
        assert_eq!(table.weight_for("technical"), dec!(0.8));
        assert_eq!(table.weight_for("sentiment"), dec!(0.5));
        assert_eq!(table.weight_for("macro"), dec!(0.1));
    }

    #[tokio::test]
    async fn negative_cached_weight_is_rejected() {
        let cache = cache(&[scalar_row(
            key_patterns::agent_weight("technical"),
            CacheCategory::AgentWeight,
            "-0.2",
        )]);
        let source = CachedWeights::new(cache, WeightTable::default());
        let result = source.weights_for(&context()).await;
        assert!(matches!(
            result,
            Err(AgentError::Engine(EngineError::InvalidWeight { .. }))
        ));
    }

    #[tokio::test]
    async fn cached_risk_metrics() {
        let cache = cache(&[scalar_row(
            key_patterns::risk_metric("volatility"),
            CacheCategory::RiskMetric,
            "0.35",
        )]);
        let metrics = CachedRiskMetrics::new(cache)
            .current_risk_metrics()
            .await
            .unwrap();
        assert_eq!(metrics.get("volatility"), Some(&dec!(0.35)));
    }

    #[tokio::test]
    async fn empty_cache_means_unavailable() {
        let result = CachedRiskMetrics::new(cache(&[]))
            .current_risk_metrics()
            .await;
        assert!(matches!(result, Err(AgentError::Unavailable(_))));
    }
}
