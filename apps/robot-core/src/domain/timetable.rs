//! Timetable document, validation and directive admission.
//!
//! The timetable is the externally refreshed list of streams enabled for a
//! trading date. Validation here is pure: the caller supplies the current
//! civil date and the loaded [`TradingSpec`], and gets back either a
//! validated [`Timetable`] or a [`TimetableRejection`] that forces a
//! stand-down.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::shared::{InstrumentId, SUPPORTED_TIMEZONE, SessionName, StreamId, TradingDate};
use super::trading_spec::TradingSpec;

// ============================================================================
// Wire document
// ============================================================================

/// Optional metadata block of a timetable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableMetadata {
    /// Replay timetables may carry a past trading date.
    #[serde(default)]
    pub replay: bool,
}

/// One stream entry as it appears in the timetable file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDirectiveDocument {
    /// Stream identifier.
    #[serde(default)]
    pub stream: String,
    /// Instrument symbol.
    #[serde(default)]
    pub instrument: String,
    /// Session name.
    #[serde(default)]
    pub session: String,
    /// Slot end time (`HH:MM`).
    #[serde(default)]
    pub slot_time: String,
    /// Whether the stream should run today. Absent means disabled.
    #[serde(default)]
    pub enabled: bool,
}

/// Timetable file as parsed from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableDocument {
    /// Civil trading date (`YYYY-MM-DD`).
    #[serde(default)]
    pub trading_date: String,
    /// Civil timezone name.
    #[serde(default)]
    pub timezone: String,
    /// Optional metadata.
    #[serde(default)]
    pub metadata: Option<TimetableMetadata>,
    /// Stream directives, in file order.
    #[serde(default)]
    pub streams: Vec<StreamDirectiveDocument>,
}

impl TimetableDocument {
    /// Whether the document is flagged as a replay timetable.
    #[must_use]
    pub fn is_replay(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.replay)
    }
}

// ============================================================================
// Validated timetable
// ============================================================================

/// A stream directive with typed identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDirective {
    /// Stream identifier.
    pub stream: StreamId,
    /// Instrument symbol.
    pub instrument: InstrumentId,
    /// Session name.
    pub session: SessionName,
    /// Slot end time as written in the timetable.
    pub slot_time: String,
    /// Whether the stream is enabled.
    pub enabled: bool,
}

impl From<&StreamDirectiveDocument> for StreamDirective {
    fn from(doc: &StreamDirectiveDocument) -> Self {
        Self {
            stream: StreamId::new(doc.stream.trim()),
            instrument: InstrumentId::new(doc.instrument.trim()),
            session: SessionName::new(doc.session.trim()),
            slot_time: doc.slot_time.trim().to_string(),
            enabled: doc.enabled,
        }
    }
}

/// A timetable that passed structural and date validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timetable {
    /// Trading date the timetable is for.
    pub trading_date: TradingDate,
    /// Always [`SUPPORTED_TIMEZONE`] after validation.
    pub timezone: String,
    /// Replay flag.
    pub replay: bool,
    /// Directives in file order (duplicates included).
    pub directives: Vec<StreamDirective>,
}

impl Timetable {
    /// Directives with duplicate stream ids collapsed, the last occurrence
    /// winning. Also returns the ids that were duplicated.
    #[must_use]
    pub fn deduplicated_directives(&self) -> (Vec<StreamDirective>, Vec<StreamId>) {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        let mut kept = Vec::with_capacity(self.directives.len());

        for directive in self.directives.iter().rev() {
            if seen.insert(directive.stream.clone()) {
                kept.push(directive.clone());
            } else if !duplicates.contains(&directive.stream) {
                duplicates.push(directive.stream.clone());
            }
        }

        kept.reverse();
        duplicates.reverse();
        (kept, duplicates)
    }
}

/// Reasons a timetable forces a stand-down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimetableRejection {
    /// Timezone differs from [`SUPPORTED_TIMEZONE`].
    #[error("timezone '{found}' is not {SUPPORTED_TIMEZONE}")]
    TimezoneMismatch {
        /// Timezone found in the document.
        found: String,
    },

    /// Trading date missing or not `YYYY-MM-DD`.
    #[error("trading date '{value}' is not a valid YYYY-MM-DD date")]
    InvalidTradingDate {
        /// Raw value found in the document.
        value: String,
    },

    /// Live timetable for a date before today.
    #[error("live timetable date {trading_date} is before today {today}")]
    StaleTradingDate {
        /// Date in the document.
        trading_date: TradingDate,
        /// Current civil date.
        today: NaiveDate,
    },

    /// Live timetable for a date after today.
    #[error("live timetable date {trading_date} is after today {today}")]
    FutureTradingDate {
        /// Date in the document.
        trading_date: TradingDate,
        /// Current civil date.
        today: NaiveDate,
    },

    /// Replay timetable for a date after today.
    #[error("replay timetable date {trading_date} is after today {today}")]
    FutureReplayDate {
        /// Date in the document.
        trading_date: TradingDate,
        /// Current civil date.
        today: NaiveDate,
    },
}

impl TimetableRejection {
    /// Stable reason code used in events and metrics.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TimezoneMismatch { .. } => "TIMEZONE_MISMATCH",
            Self::InvalidTradingDate { .. } => "INVALID_TRADING_DATE",
            Self::StaleTradingDate { .. } => "STALE_TRADING_DATE",
            Self::FutureTradingDate { .. } => "FUTURE_TRADING_DATE",
            Self::FutureReplayDate { .. } => "FUTURE_REPLAY_DATE",
        }
    }
}

/// Validate a parsed timetable against the current civil date.
///
/// A live timetable must be for `today` exactly; a replay timetable may be
/// for any date on or before `today`.
pub fn validate_timetable(
    doc: &TimetableDocument,
    today: NaiveDate,
) -> Result<Timetable, TimetableRejection> {
    if doc.timezone.trim() != SUPPORTED_TIMEZONE {
        return Err(TimetableRejection::TimezoneMismatch {
            found: doc.timezone.clone(),
        });
    }

    let trading_date: TradingDate =
        doc.trading_date
            .parse()
            .map_err(|_| TimetableRejection::InvalidTradingDate {
                value: doc.trading_date.clone(),
            })?;

    let replay = doc.is_replay();
    let date = trading_date.date();
    if replay {
        if date > today {
            return Err(TimetableRejection::FutureReplayDate {
                trading_date,
                today,
            });
        }
    } else if date < today {
        return Err(TimetableRejection::StaleTradingDate {
            trading_date,
            today,
        });
    } else if date > today {
        return Err(TimetableRejection::FutureTradingDate {
            trading_date,
            today,
        });
    }

    Ok(Timetable {
        trading_date,
        timezone: SUPPORTED_TIMEZONE.to_string(),
        replay,
        directives: doc.streams.iter().map(StreamDirective::from).collect(),
    })
}

// ============================================================================
// Directive admission
// ============================================================================

/// Why a directive did not produce or update a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Directive is not enabled.
    Disabled,
    /// One of stream, instrument, session or slot time is empty.
    MissingFields,
    /// Session is not in the specification.
    UnknownSession,
    /// Slot time is not one of the session's slot end times.
    InvalidSlotTime,
    /// Instrument is not in the specification.
    UnknownInstrument,
}

impl SkipReason {
    /// Stable reason code used in events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "STREAM_DISABLED",
            Self::MissingFields => "MISSING_FIELDS",
            Self::UnknownSession => "UNKNOWN_SESSION",
            Self::InvalidSlotTime => "INVALID_SLOT_TIME",
            Self::UnknownInstrument => "UNKNOWN_INSTRUMENT",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking one directive against the specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveDecision {
    /// Directive may create or update its stream.
    Admit,
    /// Directive is skipped.
    Skip(SkipReason),
}

/// Apply the admission rules to one directive. The first failing rule wins.
#[must_use]
pub fn admit_directive(directive: &StreamDirective, spec: &TradingSpec) -> DirectiveDecision {
    if !directive.enabled {
        return DirectiveDecision::Skip(SkipReason::Disabled);
    }

    if directive.stream.is_empty()
        || directive.instrument.is_empty()
        || directive.session.is_empty()
        || directive.slot_time.is_empty()
    {
        return DirectiveDecision::Skip(SkipReason::MissingFields);
    }

    let Some(session) = spec.session(&directive.session) else {
        return DirectiveDecision::Skip(SkipReason::UnknownSession);
    };

    if !session.allows_slot(&directive.slot_time) {
        return DirectiveDecision::Skip(SkipReason::InvalidSlotTime);
    }

    if !spec.has_instrument(&directive.instrument) {
        return DirectiveDecision::Skip(SkipReason::UnknownInstrument);
    }

    DirectiveDecision::Admit
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn spec() -> TradingSpec {
        TradingSpec::from_json(
            r#"{
                "sessions": {
                    "S1": { "range_start_time": "02:00", "slot_end_times": ["07:30", "08:00"] }
                },
                "entry_cutoff": { "market_close_time": "16:00" },
                "instruments": { "ES": { "tick_size": "0.25" } }
            }"#,
        )
        .unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn doc(date: &str, replay: bool) -> TimetableDocument {
        TimetableDocument {
            trading_date: date.to_string(),
            timezone: SUPPORTED_TIMEZONE.to_string(),
            metadata: replay.then_some(TimetableMetadata { replay: true }),
            streams: vec![],
        }
    }

    fn directive(stream: &str, instrument: &str, session: &str, slot: &str) -> StreamDirective {
        StreamDirective {
            stream: StreamId::new(stream),
            instrument: InstrumentId::new(instrument),
            session: SessionName::new(session),
            slot_time: slot.to_string(),
            enabled: true,
        }
    }

    #[test]
    fn live_timetable_for_today_is_accepted() {
        let tt = validate_timetable(&doc("2026-03-02", false), today()).unwrap();
        assert_eq!(tt.trading_date.to_string(), "2026-03-02");
        assert!(!tt.replay);
    }

    #[test_case("2026-03-01", false, "STALE_TRADING_DATE" ; "stale live")]
    #[test_case("2026-03-03", false, "FUTURE_TRADING_DATE" ; "future live")]
    #[test_case("2026-03-03", true, "FUTURE_REPLAY_DATE" ; "future replay")]
    #[test_case("03/02/2026", false, "INVALID_TRADING_DATE" ; "bad format")]
    #[test_case("", true, "INVALID_TRADING_DATE" ; "missing date")]
    fn date_rejections(date: &str, replay: bool, code: &str) {
        let err = validate_timetable(&doc(date, replay), today()).unwrap_err();
        assert_eq!(err.code(), code);
    }

    #[test]
    fn replay_accepts_past_and_current_dates() {
        assert!(validate_timetable(&doc("2025-12-31", true), today()).is_ok());
        assert!(validate_timetable(&doc("2026-03-02", true), today()).is_ok());
    }

    #[test]
    fn metadata_without_replay_is_live() {
        let mut d = doc("2026-03-01", false);
        d.metadata = Some(TimetableMetadata::default());
        assert_eq!(
            validate_timetable(&d, today()).unwrap_err().code(),
            "STALE_TRADING_DATE"
        );
    }

    proptest! {
        #[test]
        fn any_other_timezone_is_rejected(tz in "[A-Za-z/_]{0,24}") {
            prop_assume!(tz != SUPPORTED_TIMEZONE);
            let mut d = doc("2026-03-02", false);
            d.timezone = tz;
            let rejected = matches!(
                validate_timetable(&d, today()),
                Err(TimetableRejection::TimezoneMismatch { .. })
            );
            prop_assert!(rejected);
        }
    }

    #[test_case(directive("", "ES", "S1", "07:30"), Some(SkipReason::MissingFields) ; "empty stream")]
    #[test_case(directive("ES1", "", "S1", "07:30"), Some(SkipReason::MissingFields) ; "empty instrument")]
    #[test_case(directive("ES1", "ES", "", "07:30"), Some(SkipReason::MissingFields) ; "empty session")]
    #[test_case(directive("ES1", "ES", "S1", ""), Some(SkipReason::MissingFields) ; "empty slot")]
    #[test_case(directive("ES1", "ES", "S9", "07:30"), Some(SkipReason::UnknownSession) ; "unknown session")]
    #[test_case(directive("ES1", "ES", "S1", "09:30"), Some(SkipReason::InvalidSlotTime) ; "slot not in session")]
    #[test_case(directive("ZZ1", "ZZ", "S1", "07:30"), Some(SkipReason::UnknownInstrument) ; "unknown instrument")]
    #[test_case(directive("ZZ1", "ZZ", "S9", "09:30"), Some(SkipReason::UnknownSession) ; "first failing rule wins")]
    #[test_case(directive("ES1", "ES", "S1", "07:30"), None ; "valid")]
    fn admission_rules(d: StreamDirective, expected: Option<SkipReason>) {
        let decision = admit_directive(&d, &spec());
        match expected {
            Some(reason) => assert_eq!(decision, DirectiveDecision::Skip(reason)),
            None => assert_eq!(decision, DirectiveDecision::Admit),
        }
    }

    #[test]
    fn disabled_is_checked_first() {
        let mut d = directive("", "", "", "");
        d.enabled = false;
        assert_eq!(
            admit_directive(&d, &spec()),
            DirectiveDecision::Skip(SkipReason::Disabled)
        );
    }

    #[test]
    fn duplicate_streams_last_wins() {
        let mut tt = validate_timetable(&doc("2026-03-02", false), today()).unwrap();
        tt.directives = vec![
            directive("ES1", "ES", "S1", "07:30"),
            directive("NQ1", "NQ", "S1", "07:30"),
            directive("ES1", "ES", "S1", "08:00"),
        ];
        let (kept, dups) = tt.deduplicated_directives();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].stream.as_str(), "NQ1");
        assert_eq!(kept[1].slot_time, "08:00");
        assert_eq!(dups, vec![StreamId::new("ES1")]);
    }

    #[test]
    fn parses_wire_document() {
        let json = r#"{
            "trading_date": "2026-03-02",
            "timezone": "America/Chicago",
            "metadata": { "replay": true },
            "streams": [
                { "stream": "ES1", "instrument": "ES", "session": "S1", "slot_time": "07:30", "enabled": true },
                { "stream": "NQ1", "instrument": "NQ", "session": "S1", "slot_time": "07:30" }
            ]
        }"#;
        let parsed: TimetableDocument = serde_json::from_str(json).unwrap();
        assert!(parsed.is_replay());
        assert!(parsed.streams[0].enabled);
        assert!(!parsed.streams[1].enabled);
    }
}
