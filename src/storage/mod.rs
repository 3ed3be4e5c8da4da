//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - urls_tab(id, url, interval)
//! - urls_history_tab(id, response, duration, created_at)
//!
//! Callers depend on the [`UrlRegistry`] trait so the store can be swapped
//! for a test double.

pub mod schema;
pub mod sqlite;

pub use sqlite::{DbStats, SchemaStatus, SqliteStore, DEFAULT_BUSY_TIMEOUT};

use crate::Result;
use crate::record::{HistoryRecord, NewHistory, NewUrl, UrlRecord};

/// Registry of monitored URLs plus their fetch history.
///
/// Implementations must be safe to share across request handlers.
pub trait UrlRegistry: Send + Sync {
    /// Insert `new.url` or update the interval of its existing row, returning
    /// the row's id. Never creates a second row for the same url.
    fn upsert(&self, new: &NewUrl) -> Result<i64>;

    /// Remove the row with `id`. Returns whether a row was removed; a missing
    /// id is not an error.
    fn delete(&self, id: i64) -> Result<bool>;

    fn get(&self, id: i64) -> Result<Option<UrlRecord>>;

    fn list(&self) -> Result<Vec<UrlRecord>>;

    /// Append one fetch result. `entry.id` is not checked against the registry.
    fn append_history(&self, entry: &NewHistory) -> Result<()>;

    /// Fetch results for `id`, oldest first. Empty when there are none.
    fn history(&self, id: i64) -> Result<Vec<HistoryRecord>>;
}
