use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use quorum_models::cache_schema::key_patterns::{RISK_PREFIX, WEIGHT_PREFIX};
use quorum_models::cache_schema::CacheRow;
use quorum_models::{CacheConfig, RiskMetrics};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::memory::MemoryCache;
use crate::sqlite::SqliteReader;

/// Shape of scalar rows (`risk:*`, `weight:*`).
#[derive(Debug, Deserialize)]
struct ScalarValue {
    value: Decimal,
}

/// Read-through cache: moka first, then SQLite. SQLite hits by key are
/// promoted to moka.
///
/// `rusqlite::Connection` is not `Sync`, so SQLite access goes through a
/// `Mutex`. The guard is never held across an `.await`.
pub struct CacheReader {
    memory: MemoryCache,
    sqlite: Mutex<SqliteReader>,
}

impl CacheReader {
    pub fn new(sqlite: SqliteReader, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            memory: MemoryCache::new(max_capacity, memory_ttl),
            sqlite: Mutex::new(sqlite),
        }
    }

    /// Open the shared cache file named in `config`, read-only.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let sqlite = SqliteReader::open(&config.sqlite_path)?;
        Ok(Self::new(
            sqlite,
            config.memory_max_capacity,
            Duration::from_secs(config.memory_ttl_seconds),
        ))
    }

    fn sqlite(&self) -> Result<MutexGuard<'_, SqliteReader>, CacheError> {
        self.sqlite
            .lock()
            .map_err(|_| CacheError::Poisoned)
    }

    /// Typed value by key.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get_json(key).await? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|source| CacheError::Payload {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Raw JSON text by key.
    pub async fn get_json(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(json) = self.memory.get(key).await {
            return Ok(Some(json));
        }

        let row = self.sqlite()?.get(key)?;
        match row {
            Some(row) => {
                self.memory.insert(key, row.value_json.clone()).await;
                Ok(Some(row.value_json))
            }
            None => Ok(None),
        }
    }

    pub fn get_by_prefix(&self, prefix: &str) -> Result<Vec<CacheRow>, CacheError> {
        self.sqlite()?.get_by_prefix(prefix)
    }

    /// Every live entry for `symbol` merged into one JSON object keyed by
    /// cache key. Rows whose payload is not valid JSON are skipped.
    pub fn build_context_snapshot(&self, symbol: &str) -> Result<serde_json::Value, CacheError> {
        let rows = self.sqlite()?.get_by_symbol(symbol)?;
        let mut map = serde_json::Map::new();
        for row in rows {
            match serde_json::from_str::<serde_json::Value>(&row.value_json) {
                Ok(value) => {
                    map.insert(row.key, value);
                }
                Err(e) => warn!(key = %row.key, error = %e, "Skipping malformed cache row"),
            }
        }
        debug!(symbol, entries = map.len(), "Built context snapshot");
        Ok(serde_json::Value::Object(map))
    }

    /// Current portfolio risk metrics from `risk:{metric}` rows.
    ///
    /// An empty map means the pipeline published nothing live; callers decide
    /// whether that counts as "no risk" or "unknown".
    pub fn risk_metrics(&self) -> Result<RiskMetrics, CacheError> {
        self.scalars(RISK_PREFIX)
    }

    /// Agent weights from `weight:{agent_id}` rows.
    pub fn agent_weights(&self) -> Result<BTreeMap<String, Decimal>, CacheError> {
        self.scalars(WEIGHT_PREFIX)
    }

    fn scalars(&self, prefix: &str) -> Result<BTreeMap<String, Decimal>, CacheError> {
        let rows = self.get_by_prefix(prefix)?;
        let mut values = BTreeMap::new();
        for row in rows {
            let Some(name) = row.key.strip_prefix(prefix) else {
                continue;
            };
            match serde_json::from_str::<ScalarValue>(&row.value_json) {
                Ok(scalar) => {
                    values.insert(name.to_string(), scalar.value);
                }
                Err(e) => warn!(key = %row.key, error = %e, "Skipping malformed scalar row"),
            }
        }
        Ok(values)
    }

    /// Drop the hot layer; the next reads go to SQLite.
    pub fn clear_hot_cache(&self) {
        self.memory.clear();
    }

    pub async fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count().await
    }
}
