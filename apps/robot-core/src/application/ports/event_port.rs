//! Event Sink Port (Driven Port)
//!
//! Append-only structured event log, one record per event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::shared::{InstrumentId, SessionName, StreamId, TradingDate};

/// One structured event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotEvent {
    /// Event instant.
    pub ts_utc: DateTime<Utc>,
    /// Event instant in the civil timezone (RFC 3339).
    pub ts_local: String,
    /// Locked trading date, if any.
    pub trading_date: Option<TradingDate>,
    /// Stream id, or `__engine__` for engine-level events.
    pub stream: String,
    /// Instrument, if the event concerns one.
    pub instrument: Option<InstrumentId>,
    /// Session, if the event concerns a stream.
    pub session: Option<SessionName>,
    /// Slot time, if the event concerns a stream.
    pub slot_time: Option<String>,
    /// Event type (e.g. `STREAM_ARMED`).
    pub event_type: String,
    /// State label relevant to the event.
    pub state: Option<String>,
    /// Free-form payload.
    pub data: serde_json::Value,
}

impl RobotEvent {
    /// Engine-level event.
    #[must_use]
    pub fn engine(event_type: &str, ts_utc: DateTime<Utc>, ts_local: String) -> Self {
        Self {
            ts_utc,
            ts_local,
            trading_date: None,
            stream: StreamId::ENGINE.to_string(),
            instrument: None,
            session: None,
            slot_time: None,
            event_type: event_type.to_string(),
            state: None,
            data: serde_json::Value::Null,
        }
    }

    /// Set the trading date.
    #[must_use]
    pub fn with_trading_date(mut self, trading_date: Option<TradingDate>) -> Self {
        self.trading_date = trading_date;
        self
    }

    /// Attribute the event to a stream.
    #[must_use]
    pub fn with_stream(
        mut self,
        stream: &StreamId,
        instrument: &InstrumentId,
        session: Option<&SessionName>,
        slot_time: Option<&str>,
    ) -> Self {
        self.stream = stream.to_string();
        self.instrument = Some(instrument.clone());
        self.session = session.cloned();
        self.slot_time = slot_time.map(str::to_string);
        self
    }

    /// Attribute the event to an instrument only.
    #[must_use]
    pub fn with_instrument(mut self, instrument: &InstrumentId) -> Self {
        self.instrument = Some(instrument.clone());
        self
    }

    /// Set the state label.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Non-blocking event sink. Emission never fails the caller.
pub trait EventSink: Send + Sync {
    /// Record one event.
    fn emit(&self, event: RobotEvent);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: RobotEvent) {}
}
