//! Stream lifecycle as seen by the orchestrator.
//!
//! The stream workflow owns range and breakout computation. The core only
//! needs its lifecycle state, its construction parameters and the reason it
//! asks a stream to enter recovery management.

use serde::{Deserialize, Serialize};

use super::shared::{InstrumentId, SessionName, StreamId, TradingDate};

/// Lifecycle state reported by a stream workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamState {
    /// Constructed, waiting for historical data.
    PreHydration,
    /// Armed, waiting for the range window.
    Armed,
    /// Building the trading range.
    RangeBuilding,
    /// Range locked, entries possible.
    RangeLocked,
    /// Finished for the trading date.
    Done,
}

impl StreamState {
    /// Whether the stream is in an active trading state (health checks only
    /// run while at least one stream is).
    #[must_use]
    pub const fn is_active_trading(&self) -> bool {
        matches!(self, Self::Armed | Self::RangeBuilding | Self::RangeLocked)
    }

    /// Stable name used in events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PreHydration => "PRE_HYDRATION",
            Self::Armed => "ARMED",
            Self::RangeBuilding => "RANGE_BUILDING",
            Self::RangeLocked => "RANGE_LOCKED",
            Self::Done => "DONE",
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters the engine hands to the stream factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    /// Stream identifier.
    pub stream: StreamId,
    /// Instrument symbol.
    pub instrument: InstrumentId,
    /// Session name.
    pub session: SessionName,
    /// Slot end time (`HH:MM`).
    pub slot_time: String,
    /// Locked trading date.
    pub trading_date: TradingDate,
}

/// Why the recovery runner asks a stream to manage its orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryManageReason {
    /// Re-establish protective orders for an open position.
    ProtectPosition,
    /// Verify or rebuild the working orders of a locked range.
    RebuildWorkingOrders,
}

impl RecoveryManageReason {
    /// Stable name used in events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProtectPosition => "PROTECT_POSITION",
            Self::RebuildWorkingOrders => "REBUILD_WORKING_ORDERS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(StreamState::PreHydration, false)]
    #[test_case(StreamState::Armed, true)]
    #[test_case(StreamState::RangeBuilding, true)]
    #[test_case(StreamState::RangeLocked, true)]
    #[test_case(StreamState::Done, false)]
    fn active_trading_states(state: StreamState, active: bool) {
        assert_eq!(state.is_active_trading(), active);
    }

    #[test]
    fn serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&StreamState::RangeLocked).unwrap(),
            "\"RANGE_LOCKED\""
        );
    }
}
