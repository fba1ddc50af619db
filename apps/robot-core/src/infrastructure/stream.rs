//! Passive stream workflow used by the binary when no trading workflow is
//! plugged in. It follows the engine's lifecycle calls and logs them but
//! never builds a range or places orders.

use chrono::{DateTime, Utc};

use crate::application::ports::{StreamFactory, StreamWorkflow};
use crate::domain::bar::Bar;
use crate::domain::shared::{InstrumentId, StreamId, TradingDate};
use crate::domain::stream::{RecoveryManageReason, StreamParams, StreamState};

/// Factory for [`PassiveStream`].
#[derive(Debug, Clone, Default)]
pub struct PassiveStreamFactory;

impl StreamFactory for PassiveStreamFactory {
    fn create(&self, params: StreamParams) -> Box<dyn StreamWorkflow> {
        Box::new(PassiveStream::new(params))
    }
}

/// Stream that tracks its directive and lifecycle only.
#[derive(Debug)]
pub struct PassiveStream {
    params: StreamParams,
    state: StreamState,
    bars_seen: u64,
}

impl PassiveStream {
    /// Unarmed stream.
    #[must_use]
    pub const fn new(params: StreamParams) -> Self {
        Self {
            params,
            state: StreamState::PreHydration,
            bars_seen: 0,
        }
    }

    /// Bars delivered so far.
    #[must_use]
    pub const fn bars_seen(&self) -> u64 {
        self.bars_seen
    }

    /// Current slot time.
    #[must_use]
    pub fn slot_time(&self) -> &str {
        &self.params.slot_time
    }
}

impl StreamWorkflow for PassiveStream {
    fn stream_id(&self) -> &StreamId {
        &self.params.stream
    }

    fn instrument(&self) -> &InstrumentId {
        &self.params.instrument
    }

    fn state(&self) -> StreamState {
        self.state
    }

    fn committed(&self) -> bool {
        false
    }

    fn range_invalidated(&self) -> bool {
        false
    }

    fn arm(&mut self, _now: DateTime<Utc>) {
        self.state = StreamState::Armed;
        tracing::debug!(stream = %self.params.stream, "Passive stream armed");
    }

    fn tick(&mut self, _now: DateTime<Utc>) {}

    fn on_bar(&mut self, _bar: &Bar, _now: DateTime<Utc>) {
        self.bars_seen += 1;
    }

    fn apply_directive_update(&mut self, slot_time: &str, trading_date: TradingDate, _now: DateTime<Utc>) {
        self.params.slot_time = slot_time.to_string();
        self.params.trading_date = trading_date;
    }

    fn update_trading_date(&mut self, trading_date: TradingDate, _now: DateTime<Utc>) {
        tracing::debug!(stream = %self.params.stream, trading_date = %trading_date, "Passive stream rolled");
        self.params.trading_date = trading_date;
    }

    /// Holds no orders, so there is nothing to restore.
    fn enter_recovery_manage(&mut self, _now: DateTime<Utc>, reason: RecoveryManageReason) -> bool {
        tracing::debug!(stream = %self.params.stream, reason = reason.as_str(), "Passive stream recovery check");
        true
    }
}
