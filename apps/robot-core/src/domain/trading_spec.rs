//! Trading specification document.
//!
//! The specification is loaded once at startup and validated eagerly: every
//! session must have a parseable range start and at least one slot end time,
//! the market close must parse, and every instrument override must parse.
//! After validation the engine only performs lookups.
//!
//! ```json
//! {
//!   "sessions": {
//!     "S1": { "range_start_time": "02:00", "slot_end_times": ["07:30", "08:00", "09:00"] },
//!     "S2": { "range_start_time": "08:00", "slot_end_times": ["09:30", "10:00", "10:30", "11:00"] }
//!   },
//!   "entry_cutoff": { "market_close_time": "16:00" },
//!   "instruments": { "ES": { "tick_size": "0.25" }, "NQ": { "tick_size": "0.25" } }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::shared::{InstrumentId, SessionName, parse_civil_time};

/// Errors raised while loading or validating the specification.
#[derive(Debug, Error)]
pub enum SpecError {
    /// The document could not be read.
    #[error("Failed to read spec file '{path}': {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The document is not valid JSON for the expected shape.
    #[error("Failed to parse spec JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document parsed but a value is invalid.
    #[error("Invalid spec value at '{key}': {message}")]
    Invalid {
        /// Dotted path of the offending value.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

impl SpecError {
    fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Document (wire shape)
// ============================================================================

/// Raw session entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    /// Civil time (`HH:MM`) the trading range starts building.
    pub range_start_time: String,
    /// Allowed slot end times (`HH:MM`).
    pub slot_end_times: Vec<String>,
}

/// Raw entry-cutoff section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryCutoffDocument {
    /// Civil market close time (`HH:MM`).
    pub market_close_time: String,
}

/// Raw instrument entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentDocument {
    /// Minimum price increment.
    #[serde(default)]
    pub tick_size: Option<Decimal>,
    /// Instrument-specific session start on the prior civil day (`HH:MM`).
    #[serde(default)]
    pub session_start_time: Option<String>,
}

/// Raw specification document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecDocument {
    /// Sessions by name.
    pub sessions: BTreeMap<String, SessionDocument>,
    /// Entry cutoff settings.
    pub entry_cutoff: EntryCutoffDocument,
    /// Instruments by symbol.
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentDocument>,
}

// ============================================================================
// Validated specification
// ============================================================================

/// A validated session definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDefinition {
    /// Time the range starts building.
    pub range_start_time: NaiveTime,
    /// Allowed slot end times, kept as the canonical `HH:MM` strings the
    /// timetable uses.
    pub slot_end_times: BTreeSet<String>,
}

impl SessionDefinition {
    /// Whether `slot_time` is one of this session's slot end times.
    #[must_use]
    pub fn allows_slot(&self, slot_time: &str) -> bool {
        self.slot_end_times.contains(slot_time.trim())
    }
}

/// A validated instrument definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentDefinition {
    /// Minimum price increment, when known.
    pub tick_size: Option<Decimal>,
    /// Session start on the prior civil day, when it differs from the default.
    pub session_start_time: Option<NaiveTime>,
}

/// The validated trading specification.
#[derive(Debug, Clone)]
pub struct TradingSpec {
    sessions: BTreeMap<SessionName, SessionDefinition>,
    market_close_time: NaiveTime,
    instruments: BTreeMap<InstrumentId, InstrumentDefinition>,
}

impl TradingSpec {
    /// Parse and validate a JSON specification document.
    pub fn from_json(json: &str) -> Result<Self, SpecError> {
        let document: SpecDocument = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    /// Read, parse and validate a specification file.
    pub fn load(path: &str) -> Result<Self, SpecError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Validate a parsed document.
    pub fn from_document(document: SpecDocument) -> Result<Self, SpecError> {
        if document.sessions.is_empty() {
            return Err(SpecError::invalid("sessions", "at least one session is required"));
        }

        let mut sessions = BTreeMap::new();
        for (name, session) in document.sessions {
            let range_start_time = parse_civil_time(&session.range_start_time).ok_or_else(|| {
                SpecError::invalid(
                    format!("sessions.{name}.range_start_time"),
                    format!("'{}' is not HH:MM", session.range_start_time),
                )
            })?;

            if session.slot_end_times.is_empty() {
                return Err(SpecError::invalid(
                    format!("sessions.{name}.slot_end_times"),
                    "at least one slot end time is required",
                ));
            }

            let mut slot_end_times = BTreeSet::new();
            for slot in &session.slot_end_times {
                if parse_civil_time(slot).is_none() {
                    return Err(SpecError::invalid(
                        format!("sessions.{name}.slot_end_times"),
                        format!("'{slot}' is not HH:MM"),
                    ));
                }
                slot_end_times.insert(slot.trim().to_string());
            }

            sessions.insert(
                SessionName::new(name),
                SessionDefinition {
                    range_start_time,
                    slot_end_times,
                },
            );
        }

        let market_close_time = parse_civil_time(&document.entry_cutoff.market_close_time)
            .ok_or_else(|| {
                SpecError::invalid(
                    "entry_cutoff.market_close_time",
                    format!("'{}' is not HH:MM", document.entry_cutoff.market_close_time),
                )
            })?;

        let mut instruments = BTreeMap::new();
        for (symbol, instrument) in document.instruments {
            if symbol.trim().is_empty() {
                return Err(SpecError::invalid("instruments", "empty instrument symbol"));
            }
            let session_start_time = match instrument.session_start_time.as_deref() {
                Some(raw) => Some(parse_civil_time(raw).ok_or_else(|| {
                    SpecError::invalid(
                        format!("instruments.{symbol}.session_start_time"),
                        format!("'{raw}' is not HH:MM"),
                    )
                })?),
                None => None,
            };
            instruments.insert(
                InstrumentId::new(symbol),
                InstrumentDefinition {
                    tick_size: instrument.tick_size,
                    session_start_time,
                },
            );
        }

        Ok(Self {
            sessions,
            market_close_time,
            instruments,
        })
    }

    /// Look up a session by name.
    #[must_use]
    pub fn session(&self, name: &SessionName) -> Option<&SessionDefinition> {
        self.sessions.get(name)
    }

    /// Look up an instrument by symbol.
    #[must_use]
    pub fn instrument(&self, instrument: &InstrumentId) -> Option<&InstrumentDefinition> {
        self.instruments.get(instrument)
    }

    /// Whether the instrument exists in the specification.
    #[must_use]
    pub fn has_instrument(&self, instrument: &InstrumentId) -> bool {
        self.instruments.contains_key(instrument)
    }

    /// Global market close time.
    #[must_use]
    pub const fn market_close_time(&self) -> NaiveTime {
        self.market_close_time
    }

    /// Session start for an instrument, falling back to `default`.
    #[must_use]
    pub fn session_start_time(&self, instrument: &InstrumentId, default: NaiveTime) -> NaiveTime {
        self.instruments
            .get(instrument)
            .and_then(|i| i.session_start_time)
            .unwrap_or(default)
    }

    /// Session names, sorted.
    pub fn session_names(&self) -> impl Iterator<Item = &SessionName> {
        self.sessions.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"{
        "sessions": {
            "S1": { "range_start_time": "02:00", "slot_end_times": ["07:30", "08:00"] },
            "S2": { "range_start_time": "08:00", "slot_end_times": ["09:30", "11:00"] }
        },
        "entry_cutoff": { "market_close_time": "16:00" },
        "instruments": {
            "ES": { "tick_size": "0.25" },
            "CL": { "tick_size": "0.01", "session_start_time": "17:00" }
        }
    }"#;

    #[test]
    fn loads_valid_spec() {
        let spec = TradingSpec::from_json(SPEC).unwrap();
        let s1 = spec.session(&SessionName::new("S1")).unwrap();
        assert!(s1.allows_slot("07:30"));
        assert!(!s1.allows_slot("09:30"));
        assert!(spec.has_instrument(&InstrumentId::new("ES")));
        assert!(!spec.has_instrument(&InstrumentId::new("ZZ")));
        assert_eq!(
            spec.market_close_time(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap()
        );
        assert_eq!(spec.session_names().count(), 2);
    }

    #[test]
    fn session_start_falls_back_to_default() {
        let spec = TradingSpec::from_json(SPEC).unwrap();
        let default = NaiveTime::from_hms_opt(17, 30, 0).unwrap();
        assert_eq!(
            spec.session_start_time(&InstrumentId::new("ES"), default),
            default
        );
        assert_eq!(
            spec.session_start_time(&InstrumentId::new("CL"), default),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_bad_slot_time() {
        let json = SPEC.replace("\"07:30\"", "\"7:30am\"");
        let err = TradingSpec::from_json(&json).unwrap_err();
        assert!(matches!(err, SpecError::Invalid { ref key, .. } if key == "sessions.S1.slot_end_times"));
    }

    #[test]
    fn rejects_bad_market_close() {
        let json = SPEC.replace("\"16:00\"", "\"late\"");
        let err = TradingSpec::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("entry_cutoff.market_close_time"));
    }

    #[test]
    fn rejects_empty_sessions() {
        let json = r#"{ "sessions": {}, "entry_cutoff": { "market_close_time": "16:00" } }"#;
        assert!(TradingSpec::from_json(json).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            TradingSpec::from_json("{ not json"),
            Err(SpecError::Parse(_))
        ));
    }
}
