//! Registry and history records
//!
//! A [`UrlRecord`] is one monitored URL. A [`HistoryRecord`] is one fetch
//! result for a registered URL, referring back to it by id only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A monitored URL as stored in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub id: i64,
    pub url: String,
    /// Poll interval in seconds
    pub interval: i64,
}

/// Registration request for a URL, before an id is resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUrl {
    pub url: String,
    pub interval: i64,
}

impl NewUrl {
    pub fn new(url: impl Into<String>, interval: i64) -> Self {
        Self {
            url: url.into(),
            interval,
        }
    }

    /// Reject blank URLs and non-positive intervals.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::validation("url must not be empty"));
        }
        if self.interval <= 0 {
            return Err(Error::validation(format!(
                "interval must be a positive number of seconds, got {}",
                self.interval
            )));
        }
        Ok(())
    }
}

/// One fetch result for a registered URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Registry id of the URL this result belongs to (soft reference)
    pub id: i64,
    pub response: String,
    /// Fetch duration in seconds
    pub duration: f64,
    pub created_at: DateTime<Utc>,
}

/// A fetch result waiting to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistory {
    pub id: i64,
    pub response: String,
    pub duration: f64,
    pub created_at: DateTime<Utc>,
}

impl NewHistory {
    /// Build a history entry stamped with the current time.
    pub fn now(id: i64, response: impl Into<String>, duration: f64) -> Self {
        Self {
            id,
            response: response.into(),
            duration,
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(Error::validation(format!(
                "duration must be a non-negative number of seconds, got {}",
                self.duration
            )));
        }
        Ok(())
    }
}

/// Parse a record identifier as received from a path segment or CLI argument.
pub fn parse_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| Error::validation(format!("malformed identifier: {:?}", raw)))
}
