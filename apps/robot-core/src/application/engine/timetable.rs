//! Timetable ingestion: read outside the engine lock, validate and apply
//! under it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::registry::{StreamEntry, UpdateOutcome};
use super::{EngineState, PollReservation, RobotEngine, TradingSession};
use crate::application::ports::{JournalError, JournalRecord, TimetableError};
use crate::domain::shared::{StreamId, TradingDate};
use crate::domain::stream::StreamParams;
use crate::domain::timetable::{
    DirectiveDecision, StreamDirective, Timetable, TimetableDocument, admit_directive,
    validate_timetable,
};
use crate::infrastructure::metrics;

/// Skip reason when the journal could not be read.
pub(super) const JOURNAL_UNAVAILABLE: &str = "JOURNAL_UNAVAILABLE";
/// Skip reason when the journal shows a prior commit.
pub(super) const ALREADY_COMMITTED: &str = "ALREADY_COMMITTED";

type JournalLookup = Result<Option<JournalRecord>, JournalError>;

/// Everything read before the engine lock is taken.
pub(super) enum FetchedTimetable {
    Failed(TimetableError),
    Loaded {
        document: TimetableDocument,
        /// Date the journal records were read for.
        journal_date: Option<TradingDate>,
        journal: HashMap<StreamId, JournalLookup>,
    },
}

fn read_error_code(error: &TimetableError) -> &'static str {
    match error {
        TimetableError::Parse(_) => "TIMETABLE_PARSE_ERROR",
        TimetableError::Read { .. } | TimetableError::Unavailable { .. } => {
            "TIMETABLE_UNAVAILABLE"
        }
    }
}

impl RobotEngine {
    pub(super) async fn poll_timetable(&self, reservation: PollReservation, now: DateTime<Utc>) {
        let fetched = self.fetch_timetable(&reservation).await;

        let mut state = self.state.lock().await;
        if !state.running {
            return;
        }
        self.apply_fetched(&mut state, fetched, now);
        self.publish_activity(&state);
    }

    async fn fetch_timetable(&self, reservation: &PollReservation) -> FetchedTimetable {
        let document = match self.deps.timetable.load().await {
            Ok(document) => document,
            Err(e) => return FetchedTimetable::Failed(e),
        };

        let journal_date = document.trading_date.trim().parse::<TradingDate>().ok();
        let mut journal = HashMap::new();
        if let Some(date) = journal_date {
            for directive in document.streams.iter().filter(|d| d.enabled) {
                let stream = StreamId::new(directive.stream.trim());
                if stream.is_empty()
                    || reservation.known.contains(&stream)
                    || journal.contains_key(&stream)
                {
                    continue;
                }
                let lookup = self.deps.journal.load(date, &stream).await;
                journal.insert(stream, lookup);
            }
        }

        FetchedTimetable::Loaded {
            document,
            journal_date,
            journal,
        }
    }

    fn apply_fetched(&self, state: &mut EngineState, fetched: FetchedTimetable, now: DateTime<Utc>) {
        let (document, journal_date, mut journal) = match fetched {
            FetchedTimetable::Failed(e) => {
                tracing::warn!(error = %e, "Timetable read failed");
                self.stand_down(
                    state,
                    read_error_code(&e),
                    serde_json::json!({ "error": e.to_string() }),
                    now,
                );
                return;
            }
            FetchedTimetable::Loaded {
                document,
                journal_date,
                journal,
            } => (document, journal_date, journal),
        };

        let today = self.deps.calendar.civil_date(now);
        let timetable = match validate_timetable(&document, today) {
            Ok(timetable) => timetable,
            Err(rejection) => {
                self.stand_down(
                    state,
                    rejection.code(),
                    serde_json::json!({ "error": rejection.to_string() }),
                    now,
                );
                return;
            }
        };
        state.last_stand_down = None;

        if state.session.is_none() {
            tracing::info!(
                trading_date = %timetable.trading_date,
                replay = timetable.replay,
                "Trading date locked"
            );
            self.emit(
                self.event("TRADING_DATE_LOCKED", now, Some(timetable.trading_date))
                    .with_data(serde_json::json!({ "replay": timetable.replay })),
            );
            state.session = Some(TradingSession::new(timetable.trading_date, timetable.replay));
        }
        let Some(session) = state.session.as_mut() else {
            return;
        };

        if session.trading_date != timetable.trading_date {
            if session.mismatch_reported != Some(timetable.trading_date) {
                session.mismatch_reported = Some(timetable.trading_date);
                tracing::warn!(
                    locked = %session.trading_date,
                    timetable = %timetable.trading_date,
                    "Timetable trading date differs from the locked date; ignoring timetable"
                );
                self.emit(
                    self.event("TRADING_DATE_MISMATCH", now, Some(session.trading_date))
                        .with_data(serde_json::json!({
                            "locked": session.trading_date.to_string(),
                            "timetable": timetable.trading_date.to_string(),
                        })),
                );
            }
            return;
        }

        if journal_date != Some(session.trading_date) {
            journal.clear();
        }
        self.apply_directives(session, &timetable, &mut journal, now);
        metrics::set_streams(session.streams.len());
    }

    fn apply_directives(
        &self,
        session: &mut TradingSession,
        timetable: &Timetable,
        journal: &mut HashMap<StreamId, JournalLookup>,
        now: DateTime<Utc>,
    ) {
        let (directives, duplicates) = timetable.deduplicated_directives();
        for stream in &duplicates {
            if session.first_report(stream, "DUPLICATE_STREAM_ID") {
                tracing::warn!(stream = %stream, "Duplicate stream id in timetable; last occurrence wins");
                self.emit(
                    self.event("DUPLICATE_STREAM_ID", now, Some(session.trading_date))
                        .with_data(serde_json::json!({ "stream": stream.as_str() })),
                );
            }
        }

        for directive in &directives {
            if let DirectiveDecision::Skip(reason) = admit_directive(directive, &self.deps.spec) {
                self.report_skip(session, directive, reason.as_str(), serde_json::Value::Null, now);
                continue;
            }

            if session.streams.contains(&directive.stream) {
                self.update_stream(session, directive, now);
            } else {
                let lookup = journal.remove(&directive.stream);
                self.create_stream(session, directive, lookup, now);
            }
        }
    }

    fn update_stream(&self, session: &mut TradingSession, directive: &StreamDirective, now: DateTime<Utc>) {
        let trading_date = session.trading_date;
        let outcome = session
            .streams
            .update(&directive.stream, &directive.slot_time, |workflow| {
                workflow.apply_directive_update(&directive.slot_time, trading_date, now);
            });

        match outcome {
            Some(UpdateOutcome::Applied) => {
                tracing::info!(
                    stream = %directive.stream,
                    slot_time = %directive.slot_time,
                    "Stream directive updated"
                );
                self.emit(
                    self.event("STREAM_UPDATED", now, Some(trading_date)).with_stream(
                        &directive.stream,
                        &directive.instrument,
                        Some(&directive.session),
                        Some(&directive.slot_time),
                    ),
                );
            }
            Some(ignored) => {
                if let Some(reason) = ignored.reason()
                    && session.first_report(&directive.stream, reason)
                {
                    tracing::debug!(stream = %directive.stream, reason, "Directive update ignored");
                    self.emit(
                        self.event("TIMETABLE_UPDATE_IGNORED", now, Some(trading_date))
                            .with_stream(
                                &directive.stream,
                                &directive.instrument,
                                Some(&directive.session),
                                Some(&directive.slot_time),
                            )
                            .with_data(serde_json::json!({ "reason": reason })),
                    );
                }
            }
            None => {}
        }
    }

    fn create_stream(
        &self,
        session: &mut TradingSession,
        directive: &StreamDirective,
        lookup: Option<JournalLookup>,
        now: DateTime<Utc>,
    ) {
        let committed = match lookup {
            Some(Ok(record)) => record.is_some_and(|r| r.committed),
            Some(Err(e)) => {
                self.report_skip(
                    session,
                    directive,
                    JOURNAL_UNAVAILABLE,
                    serde_json::json!({ "error": e.to_string() }),
                    now,
                );
                return;
            }
            None => {
                self.report_skip(session, directive, JOURNAL_UNAVAILABLE, serde_json::Value::Null, now);
                return;
            }
        };

        let mut workflow = self.deps.streams.create(StreamParams {
            stream: directive.stream.clone(),
            instrument: directive.instrument.clone(),
            session: directive.session.clone(),
            slot_time: directive.slot_time.clone(),
            trading_date: session.trading_date,
        });

        if committed {
            session.streams.insert(
                directive.stream.clone(),
                StreamEntry {
                    workflow,
                    slot_time: directive.slot_time.clone(),
                    armed: false,
                },
            );
            self.report_skip(session, directive, ALREADY_COMMITTED, serde_json::Value::Null, now);
            return;
        }

        workflow.arm(now);
        let state = workflow.state();
        session.streams.insert(
            directive.stream.clone(),
            StreamEntry {
                workflow,
                slot_time: directive.slot_time.clone(),
                armed: true,
            },
        );

        tracing::info!(
            stream = %directive.stream,
            instrument = %directive.instrument,
            session = %directive.session,
            slot_time = %directive.slot_time,
            "Stream armed"
        );
        self.emit(
            self.event("TIMETABLE_DIRECTIVE_ACCEPTED", now, Some(session.trading_date)).with_stream(
                &directive.stream,
                &directive.instrument,
                Some(&directive.session),
                Some(&directive.slot_time),
            ),
        );
        self.emit(
            self.event("STREAM_ARMED", now, Some(session.trading_date))
                .with_stream(
                    &directive.stream,
                    &directive.instrument,
                    Some(&directive.session),
                    Some(&directive.slot_time),
                )
                .with_state(state.as_str()),
        );
    }

    /// Log and emit a skipped directive, once per (stream, reason).
    fn report_skip(
        &self,
        session: &mut TradingSession,
        directive: &StreamDirective,
        reason: &'static str,
        detail: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        if !session.first_report(&directive.stream, reason) {
            return;
        }
        tracing::info!(stream = %directive.stream, reason, "Timetable directive skipped");
        self.emit(
            self.event("TIMETABLE_DIRECTIVE_SKIPPED", now, Some(session.trading_date))
                .with_stream(
                    &directive.stream,
                    &directive.instrument,
                    Some(&directive.session),
                    Some(&directive.slot_time),
                )
                .with_data(serde_json::json!({ "reason": reason, "detail": detail })),
        );
    }
}
