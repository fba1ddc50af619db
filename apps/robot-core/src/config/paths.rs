//! File locations of the external documents the core reads and writes.

use serde::{Deserialize, Serialize};

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Trading specification (JSON).
    #[serde(default = "default_spec_path")]
    pub spec_path: String,
    /// Current timetable (JSON).
    #[serde(default = "default_timetable_path")]
    pub timetable_path: String,
    /// Directory of per-stream journal records.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,
    /// Structured event log (JSON lines).
    #[serde(default = "default_event_log_path")]
    pub event_log_path: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            spec_path: default_spec_path(),
            timetable_path: default_timetable_path(),
            journal_dir: default_journal_dir(),
            event_log_path: default_event_log_path(),
        }
    }
}

fn default_spec_path() -> String {
    "config/trading_spec.json".to_string()
}

fn default_timetable_path() -> String {
    "data/timetable/timetable_current.json".to_string()
}

fn default_journal_dir() -> String {
    "logs/journal".to_string()
}

fn default_event_log_path() -> String {
    "logs/robot_events.jsonl".to_string()
}
