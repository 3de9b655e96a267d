use std::time::Duration;

use moka::future::Cache;

/// Hot in-process layer in front of SQLite.
///
/// Holds raw JSON text keyed by cache key; entries expire after `ttl` so a
/// pipeline rewrite of the SQLite row is picked up within one TTL.
pub struct MemoryCache {
    inner: Cache<String, String>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: impl Into<String>, value_json: impl Into<String>) {
        self.inner.insert(key.into(), value_json.into()).await;
    }

    /// Drop every hot entry so the next read goes back to SQLite.
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Approximate entry count after flushing pending maintenance.
    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}
