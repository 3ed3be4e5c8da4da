//! # Fetcher - Monitored URL Registry
//!
//! Keeps a durable registry of URLs to be polled at a fixed interval, together
//! with an append-only history of fetch results for each registered URL.
//!
//! Fetcher provides:
//! - Identity-stable upsert of URLs (one row per distinct URL, ids never reused)
//! - Append-only fetch history keyed by registry id
//! - SQLite-backed storage behind the [`UrlRegistry`] trait
//! - A thin axum HTTP layer and a CLI over the same store

pub mod record;
pub mod storage;
pub mod server;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use record::{HistoryRecord, NewHistory, NewUrl, UrlRecord};
pub use storage::{SqliteStore, UrlRegistry};

/// Result type alias for Fetcher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Fetcher operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Schema initialization failed: {0}")]
    Schema(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
