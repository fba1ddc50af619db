//! Disconnect recovery states and connection status.

use serde::{Deserialize, Serialize};

/// Process-wide recovery state. Only [`RecoveryState::ConnectedOk`] and
/// [`RecoveryState::RecoveryComplete`] allow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryState {
    /// Connected, no disconnect seen in this run.
    ConnectedOk,
    /// Disconnected; execution blocked.
    DisconnectFailClosed,
    /// Reconnected, waiting for broker synchronization.
    ReconnectedRecoveryPending,
    /// Reconciling broker state.
    RecoveryRunning,
    /// Reconciliation finished.
    RecoveryComplete,
}

impl RecoveryState {
    /// Whether order placement is permitted in this state.
    #[must_use]
    pub const fn allows_execution(&self) -> bool {
        matches!(self, Self::ConnectedOk | Self::RecoveryComplete)
    }

    /// Stable name used in events and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectedOk => "CONNECTED_OK",
            Self::DisconnectFailClosed => "DISCONNECT_FAIL_CLOSED",
            Self::ReconnectedRecoveryPending => "RECONNECTED_RECOVERY_PENDING",
            Self::RecoveryRunning => "RECOVERY_RUNNING",
            Self::RecoveryComplete => "RECOVERY_COMPLETE",
        }
    }

    /// Numeric code for the state gauge.
    #[must_use]
    pub const fn gauge_value(&self) -> f64 {
        match self {
            Self::ConnectedOk => 0.0,
            Self::DisconnectFailClosed => 1.0,
            Self::ReconnectedRecoveryPending => 2.0,
            Self::RecoveryRunning => 3.0,
            Self::RecoveryComplete => 4.0,
        }
    }
}

impl std::fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker connection status as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// Connected.
    Connected,
    /// Connection lost.
    ConnectionLost,
    /// Disconnected deliberately or by the platform.
    Disconnected,
}

impl ConnectionStatus {
    /// Whether the status counts as connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(RecoveryState::ConnectedOk, true)]
    #[test_case(RecoveryState::DisconnectFailClosed, false)]
    #[test_case(RecoveryState::ReconnectedRecoveryPending, false)]
    #[test_case(RecoveryState::RecoveryRunning, false)]
    #[test_case(RecoveryState::RecoveryComplete, true)]
    fn execution_allowed_only_when_settled(state: RecoveryState, allowed: bool) {
        assert_eq!(state.allows_execution(), allowed);
    }

    #[test]
    fn wire_names() {
        assert_eq!(
            serde_json::to_string(&RecoveryState::ReconnectedRecoveryPending).unwrap(),
            "\"RECONNECTED_RECOVERY_PENDING\""
        );
        assert_eq!(
            RecoveryState::DisconnectFailClosed.to_string(),
            "DISCONNECT_FAIL_CLOSED"
        );
    }
}
