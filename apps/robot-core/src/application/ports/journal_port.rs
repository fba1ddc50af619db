//! Journal Reader Port (Driven Port)
//!
//! The stream workflow writes one journal record per (trading date, stream).
//! The orchestrator only reads it to avoid re-arming a committed stream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::shared::{StreamId, TradingDate};

/// Persisted per-stream record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Whether the stream committed for the trading date.
    #[serde(default)]
    pub committed: bool,
    /// Why it committed.
    #[serde(default)]
    pub commit_reason: Option<String>,
    /// Last lifecycle state written.
    #[serde(default)]
    pub last_state: Option<String>,
    /// Last write instant.
    #[serde(default)]
    pub last_update_utc: Option<DateTime<Utc>>,
    /// Hash of the timetable in force when the stream committed.
    #[serde(default)]
    pub timetable_hash_at_commit: Option<String>,
}

/// Journal read error.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// The record exists but could not be read.
    #[error("Failed to read journal '{path}': {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The record exists but is not valid JSON.
    #[error("Failed to parse journal '{path}': {source}")]
    Parse {
        /// Path that was read.
        path: String,
        /// Underlying parse error.
        source: serde_json::Error,
    },
}

/// Port for journal lookups.
#[async_trait]
pub trait JournalReader: Send + Sync {
    /// Load the record for a stream; `Ok(None)` when none was written.
    async fn load(
        &self,
        trading_date: TradingDate,
        stream: &StreamId,
    ) -> Result<Option<JournalRecord>, JournalError>;
}
