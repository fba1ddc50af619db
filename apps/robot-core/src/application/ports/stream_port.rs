//! Stream Workflow Port (Driven Port)
//!
//! The per-stream trading workflow owns range and breakout computation and
//! its journal-backed commit. The orchestrator only drives its lifecycle.

use chrono::{DateTime, Utc};

use crate::domain::bar::Bar;
use crate::domain::shared::{InstrumentId, StreamId, TradingDate};
use crate::domain::stream::{RecoveryManageReason, StreamParams, StreamState};

/// Lifecycle contract of one stream.
///
/// Calls are made under the engine lock, so implementations must not block.
pub trait StreamWorkflow: Send {
    /// Stream identifier.
    fn stream_id(&self) -> &StreamId;

    /// Instrument the stream trades.
    fn instrument(&self) -> &InstrumentId;

    /// Current lifecycle state.
    fn state(&self) -> StreamState;

    /// Whether the stream has committed for the trading date.
    fn committed(&self) -> bool;

    /// Whether the computed range was invalidated (e.g. by a data gap).
    fn range_invalidated(&self) -> bool;

    /// Arm the stream for the trading date.
    fn arm(&mut self, now: DateTime<Utc>);

    /// Periodic processing.
    fn tick(&mut self, now: DateTime<Utc>);

    /// Feed one admitted bar.
    fn on_bar(&mut self, bar: &Bar, now: DateTime<Utc>);

    /// Apply a changed directive to an existing, uncommitted stream.
    fn apply_directive_update(&mut self, slot_time: &str, trading_date: TradingDate, now: DateTime<Utc>);

    /// Move the stream to a new trading date.
    fn update_trading_date(&mut self, trading_date: TradingDate, now: DateTime<Utc>);

    /// Ask the stream to verify or re-establish its orders after a reconnect.
    ///
    /// Returns `true` when the stream confirms its orders are in place.
    fn enter_recovery_manage(&mut self, now: DateTime<Utc>, reason: RecoveryManageReason) -> bool;
}

/// Creates stream workflows for admitted directives.
pub trait StreamFactory: Send + Sync {
    /// Construct a stream. The stream is not armed yet.
    fn create(&self, params: StreamParams) -> Box<dyn StreamWorkflow>;
}
