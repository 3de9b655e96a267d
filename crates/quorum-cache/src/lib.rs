//! Read-only access to the shared SQLite cache that external pipelines fill
//! with market data, portfolio risk metrics and agent weights.

pub mod error;
pub mod memory;
pub mod reader;
pub mod sqlite;

pub use error::CacheError;
pub use reader::CacheReader;
pub use sqlite::SqliteReader;
