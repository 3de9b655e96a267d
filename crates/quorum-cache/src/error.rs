use thiserror::Error;

/// Failures reading the shared pipeline cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache file is missing or not a SQLite database.
    #[error("Cannot open cache file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Cache query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// A live row whose value does not decode into the requested type.
    #[error("Malformed cached value for {key}: {source}")]
    Payload {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cache connection lock poisoned")]
    Poisoned,
}
