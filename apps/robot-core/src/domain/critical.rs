//! Critical event kinds accepted for operator notification.

use std::str::FromStr;

/// Whitelisted critical event kinds. Anything else is rejected before it can
/// reach the notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriticalEventKind {
    /// The execution gate observed an impossible state.
    ExecutionGateInvariantViolation,
    /// The engine entered fail-closed on disconnect.
    DisconnectFailClosedEntered,
    /// Recovery found a position no stream owns.
    RecoveryPositionUnmatched,
    /// The trading date disagreed with bar data after rollover.
    TradingDateInvariantViolation,
    /// The engine was started in an execution mode not authorized.
    ExecutionModeNotAuthorized,
}

impl CriticalEventKind {
    /// Every accepted kind.
    pub const ALL: [Self; 5] = [
        Self::ExecutionGateInvariantViolation,
        Self::DisconnectFailClosedEntered,
        Self::RecoveryPositionUnmatched,
        Self::TradingDateInvariantViolation,
        Self::ExecutionModeNotAuthorized,
    ];

    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutionGateInvariantViolation => "EXECUTION_GATE_INVARIANT_VIOLATION",
            Self::DisconnectFailClosedEntered => "DISCONNECT_FAIL_CLOSED_ENTERED",
            Self::RecoveryPositionUnmatched => "RECOVERY_POSITION_UNMATCHED",
            Self::TradingDateInvariantViolation => "TRADING_DATE_INVARIANT_VIOLATION",
            Self::ExecutionModeNotAuthorized => "EXECUTION_MODE_NOT_AUTHORIZED",
        }
    }
}

impl std::fmt::Display for CriticalEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a kind is not on the whitelist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("critical event kind '{0}' is not whitelisted")]
pub struct UnknownCriticalEvent(pub String);

impl FromStr for CriticalEventKind {
    type Err = UnknownCriticalEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownCriticalEvent(s.to_string()))
    }
}
