//! Disconnect Recovery
//!
//! Governs whether order execution is permitted and drives broker-state
//! reconciliation after a reconnect.
//!
//! # State Machine
//!
//! ```text
//!   CONNECTED_OK ──disconnect──► DISCONNECT_FAIL_CLOSED ◄──disconnect── (PENDING | RUNNING)
//!        ▲                              │
//!        │                          reconnect
//!        │                              ▼
//!   RECOVERY_COMPLETE ◄──run ok── RECOVERY_RUNNING ◄──gate── RECONNECTED_RECOVERY_PENDING
//!        │
//!        └──disconnect──► DISCONNECT_FAIL_CLOSED
//! ```
//!
//! Only `CONNECTED_OK` and `RECOVERY_COMPLETE` allow execution. The state
//! lives behind its own lock so [`RecoveryCoordinator::execution_allowed`]
//! can be consulted synchronously from any thread without taking the engine
//! lock.

mod runner;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub use runner::{RecoveryRun, RecoveryRunOutcome, RecoveryStream};

use crate::application::health::{AlertDispatcher, CriticalScope};
use crate::config::RecoveryConfig;
use crate::domain::critical::CriticalEventKind;
use crate::domain::recovery::{ConnectionStatus, RecoveryState};
use crate::domain::shared::RunId;
use crate::infrastructure::metrics;

/// A state change caused by a connection status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryTransition {
    /// State before the update.
    pub from: RecoveryState,
    /// State after the update.
    pub to: RecoveryState,
}

/// Why the broker synchronization gate is still closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateWait {
    /// Connection not currently reported connected.
    NotConnected,
    /// No reconnect instant recorded.
    NoReconnectInstant,
    /// No order or execution update since the reconnect.
    NoBrokerUpdate,
    /// Updates are still arriving inside the quiet window.
    QuietWindow,
}

impl GateWait {
    /// Stable name used in logs and events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::NoReconnectInstant => "NO_RECONNECT_INSTANT",
            Self::NoBrokerUpdate => "NO_BROKER_UPDATE",
            Self::QuietWindow => "QUIET_WINDOW",
        }
    }
}

/// Result of evaluating the broker synchronization gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Not in `RECONNECTED_RECOVERY_PENDING`; nothing to gate.
    NotPending,
    /// Still waiting. `diagnostic_due` is set when the rate-limited
    /// diagnostic was emitted by this call.
    Waiting {
        /// Reason the gate is closed.
        reason: GateWait,
        /// Whether this call emitted the waiting diagnostic.
        diagnostic_due: bool,
    },
    /// Gate passed; the state is now `RECOVERY_RUNNING`.
    Ready,
}

/// Copy of the recovery bookkeeping, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryStatus {
    /// Current state.
    pub state: RecoveryState,
    /// Last reported connection status, if any.
    pub connection: Option<ConnectionStatus>,
    /// First disconnect of the current episode.
    pub disconnect_first_at: Option<DateTime<Utc>>,
    /// Last reconnect.
    pub reconnected_at: Option<DateTime<Utc>>,
    /// Start of the current recovery.
    pub recovery_started_at: Option<DateTime<Utc>>,
    /// Completion of the last recovery.
    pub recovery_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct RecoveryInner {
    state: RecoveryState,
    connection: Option<ConnectionStatus>,
    disconnect_first_at: Option<DateTime<Utc>>,
    reconnected_at: Option<DateTime<Utc>>,
    last_order_update_at: Option<DateTime<Utc>>,
    last_execution_update_at: Option<DateTime<Utc>>,
    recovery_started_at: Option<DateTime<Utc>>,
    recovery_completed_at: Option<DateTime<Utc>>,
    last_pending_diag_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
    last_blocked_report: Option<(RecoveryRunOutcome, DateTime<Utc>)>,
    disconnect_seq: u64,
}

impl RecoveryInner {
    const fn new() -> Self {
        Self {
            state: RecoveryState::ConnectedOk,
            connection: None,
            disconnect_first_at: None,
            reconnected_at: None,
            last_order_update_at: None,
            last_execution_update_at: None,
            recovery_started_at: None,
            recovery_completed_at: None,
            last_pending_diag_at: None,
            next_retry_at: None,
            last_blocked_report: None,
            disconnect_seq: 0,
        }
    }

    fn latest_broker_update(&self) -> Option<DateTime<Utc>> {
        match (self.last_order_update_at, self.last_execution_update_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    fn connection_known_down(&self) -> bool {
        self.connection.is_some_and(|c| !c.is_connected())
    }

    fn set_state(&mut self, to: RecoveryState) -> RecoveryTransition {
        let from = self.state;
        self.state = to;
        metrics::set_recovery_state(to);
        RecoveryTransition { from, to }
    }
}

/// Disconnect recovery state machine, gate and runner.
pub struct RecoveryCoordinator {
    config: RecoveryConfig,
    run_id: RunId,
    alerts: Arc<AlertDispatcher>,
    inner: Mutex<RecoveryInner>,
    run_lock: tokio::sync::Mutex<()>,
    running: AtomicBool,
}

impl RecoveryCoordinator {
    /// Create a coordinator in `CONNECTED_OK`.
    #[must_use]
    pub fn new(config: RecoveryConfig, run_id: RunId, alerts: Arc<AlertDispatcher>) -> Self {
        metrics::set_recovery_state(RecoveryState::ConnectedOk);
        Self {
            config,
            run_id,
            alerts,
            inner: Mutex::new(RecoveryInner::new()),
            run_lock: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RecoveryState {
        self.inner.lock().state
    }

    /// Copy of the bookkeeping.
    #[must_use]
    pub fn status(&self) -> RecoveryStatus {
        let inner = self.inner.lock();
        RecoveryStatus {
            state: inner.state,
            connection: inner.connection,
            disconnect_first_at: inner.disconnect_first_at,
            reconnected_at: inner.reconnected_at,
            recovery_started_at: inner.recovery_started_at,
            recovery_completed_at: inner.recovery_completed_at,
        }
    }

    /// Whether order placement is permitted right now.
    ///
    /// False in every state except `CONNECTED_OK` and `RECOVERY_COMPLETE`,
    /// and false whenever the connection is known to be down.
    #[must_use]
    pub fn execution_allowed(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.allows_execution() {
            return false;
        }
        if inner.connection_known_down() {
            let state = inner.state;
            inner.set_state(RecoveryState::DisconnectFailClosed);
            inner.disconnect_seq += 1;
            drop(inner);
            tracing::error!(
                state = %state,
                "Execution gate invariant violated: state allows execution while disconnected"
            );
            self.report(
                CriticalEventKind::ExecutionGateInvariantViolation,
                &format!("Recovery state {state} allowed execution while the broker connection was down; forced fail-closed."),
                now,
            );
            return false;
        }
        true
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Apply a connection status change.
    pub fn on_connection_status(
        &self,
        status: ConnectionStatus,
        now: DateTime<Utc>,
    ) -> Option<RecoveryTransition> {
        let mut inner = self.inner.lock();
        inner.connection = Some(status);

        let transition = if status.is_connected() {
            if inner.state != RecoveryState::DisconnectFailClosed {
                return None;
            }
            inner.reconnected_at = Some(now);
            inner.last_order_update_at = None;
            inner.last_execution_update_at = None;
            inner.last_pending_diag_at = None;
            inner.next_retry_at = None;
            inner.last_blocked_report = None;
            inner.set_state(RecoveryState::ReconnectedRecoveryPending)
        } else {
            match inner.state {
                RecoveryState::DisconnectFailClosed => return None,
                RecoveryState::ConnectedOk | RecoveryState::RecoveryComplete => {
                    inner.disconnect_first_at = Some(now);
                    inner.recovery_started_at = None;
                }
                RecoveryState::ReconnectedRecoveryPending | RecoveryState::RecoveryRunning => {
                    inner.disconnect_first_at.get_or_insert(now);
                }
            }
            inner.disconnect_seq += 1;
            inner.set_state(RecoveryState::DisconnectFailClosed)
        };
        drop(inner);

        tracing::warn!(
            from = %transition.from,
            to = %transition.to,
            status = ?status,
            "Recovery state changed"
        );

        if transition.to == RecoveryState::DisconnectFailClosed
            && transition.from != RecoveryState::DisconnectFailClosed
        {
            self.report(
                CriticalEventKind::DisconnectFailClosedEntered,
                &format!(
                    "Broker connection {status:?} at {}; execution blocked until recovery completes.",
                    now.to_rfc3339()
                ),
                now,
            );
        }

        Some(transition)
    }

    /// Record an order update from the broker.
    pub fn on_order_update(&self, now: DateTime<Utc>) {
        self.inner.lock().last_order_update_at = Some(now);
    }

    /// Record an execution update from the broker.
    pub fn on_execution_update(&self, now: DateTime<Utc>) {
        self.inner.lock().last_execution_update_at = Some(now);
    }

    // ========================================================================
    // Broker Synchronization Gate
    // ========================================================================

    /// Evaluate the broker synchronization gate.
    ///
    /// Passes only when the connection is up, a reconnect instant is
    /// recorded, at least one broker update arrived at or after it, and no
    /// further update arrived during the quiet window.
    pub fn gate(&self, now: DateTime<Utc>) -> GateDecision {
        let mut inner = self.inner.lock();
        if inner.state != RecoveryState::ReconnectedRecoveryPending {
            return GateDecision::NotPending;
        }

        let wait = if !inner.connection.is_some_and(|c| c.is_connected()) {
            Some(GateWait::NotConnected)
        } else if let Some(reconnected_at) = inner.reconnected_at {
            match inner.latest_broker_update() {
                Some(latest) if latest >= reconnected_at => {
                    (now - latest < self.config.broker_sync_quiet()).then_some(GateWait::QuietWindow)
                }
                _ => Some(GateWait::NoBrokerUpdate),
            }
        } else {
            Some(GateWait::NoReconnectInstant)
        };

        if let Some(reason) = wait {
            let diagnostic_due = inner
                .last_pending_diag_at
                .is_none_or(|last| now - last >= self.config.pending_diagnostic_interval());
            if diagnostic_due {
                inner.last_pending_diag_at = Some(now);
                tracing::info!(
                    reason = reason.as_str(),
                    reconnected_at = ?inner.reconnected_at,
                    last_broker_update = ?inner.latest_broker_update(),
                    "Recovery pending: waiting for broker synchronization"
                );
            }
            return GateDecision::Waiting {
                reason,
                diagnostic_due,
            };
        }

        inner.recovery_started_at = Some(now);
        inner.next_retry_at = None;
        inner.set_state(RecoveryState::RecoveryRunning);
        tracing::info!("Broker synchronized; recovery running");
        GateDecision::Ready
    }

    fn report(&self, kind: CriticalEventKind, message: &str, now: DateTime<Utc>) {
        self.alerts.report_critical_kind(
            kind,
            CriticalScope {
                run_id: Some(&self.run_id),
                trading_date: None,
            },
            message,
            now,
        );
    }
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("run_id", &self.run_id)
            .field("inner", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{Notification, NotificationSink};
    use chrono::Duration;

    #[derive(Default)]
    struct KindSink {
        kinds: Mutex<Vec<String>>,
    }

    impl NotificationSink for KindSink {
        fn enqueue(&self, notification: Notification) {
            self.kinds.lock().push(notification.kind);
        }
    }

    fn coordinator() -> (RecoveryCoordinator, Arc<KindSink>) {
        let sink = Arc::new(KindSink::default());
        let alerts = Arc::new(AlertDispatcher::new(sink.clone(), Duration::minutes(5)));
        (
            RecoveryCoordinator::new(RecoveryConfig::default(), RunId::new("run-test"), alerts),
            sink,
        )
    }

    #[test]
    fn disconnect_fails_closed_and_reconnect_goes_pending() {
        let (c, sink) = coordinator();
        let t0 = Utc::now();
        assert!(c.execution_allowed(t0));

        let t = c.on_connection_status(ConnectionStatus::ConnectionLost, t0).unwrap();
        assert_eq!(t.to, RecoveryState::DisconnectFailClosed);
        assert!(!c.execution_allowed(t0));
        assert_eq!(c.status().disconnect_first_at, Some(t0));
        assert_eq!(sink.kinds.lock().as_slice(), ["DISCONNECT_FAIL_CLOSED_ENTERED"]);

        assert!(c
            .on_connection_status(ConnectionStatus::Disconnected, t0 + Duration::seconds(1))
            .is_none());

        let t = c
            .on_connection_status(ConnectionStatus::Connected, t0 + Duration::seconds(10))
            .unwrap();
        assert_eq!(t.to, RecoveryState::ReconnectedRecoveryPending);
        assert!(!c.execution_allowed(t0 + Duration::seconds(10)));
    }

    #[test]
    fn gate_never_opens_without_post_reconnect_update() {
        let (c, _) = coordinator();
        let t0 = Utc::now();
        c.on_connection_status(ConnectionStatus::ConnectionLost, t0);
        c.on_order_update(t0 + Duration::seconds(2));
        c.on_connection_status(ConnectionStatus::Connected, t0 + Duration::seconds(10));

        for secs in [11, 20, 60, 600] {
            assert!(matches!(
                c.gate(t0 + Duration::seconds(secs)),
                GateDecision::Waiting {
                    reason: GateWait::NoBrokerUpdate,
                    ..
                }
            ));
        }
        assert_eq!(c.state(), RecoveryState::ReconnectedRecoveryPending);
    }

    #[test]
    fn gate_requires_quiet_window_after_last_update() {
        let (c, _) = coordinator();
        let t0 = Utc::now();
        c.on_connection_status(ConnectionStatus::ConnectionLost, t0);
        c.on_connection_status(ConnectionStatus::Connected, t0 + Duration::seconds(10));
        c.on_execution_update(t0 + Duration::seconds(11));
        assert!(matches!(
            c.gate(t0 + Duration::seconds(14)),
            GateDecision::Waiting {
                reason: GateWait::QuietWindow,
                ..
            }
        ));
        c.on_order_update(t0 + Duration::seconds(14));
        assert!(matches!(
            c.gate(t0 + Duration::seconds(18)),
            GateDecision::Waiting { .. }
        ));
        assert_eq!(c.gate(t0 + Duration::seconds(19)), GateDecision::Ready);
        assert_eq!(c.state(), RecoveryState::RecoveryRunning);
        assert!(!c.execution_allowed(t0 + Duration::seconds(19)));
    }

    #[test]
    fn pending_diagnostic_is_rate_limited() {
        let (c, _) = coordinator();
        let t0 = Utc::now();
        c.on_connection_status(ConnectionStatus::ConnectionLost, t0);
        c.on_connection_status(ConnectionStatus::Connected, t0);
        let due = |secs| match c.gate(t0 + Duration::seconds(secs)) {
            GateDecision::Waiting { diagnostic_due, .. } => diagnostic_due,
            other => panic!("unexpected {other:?}"),
        };
        assert!(due(1));
        assert!(!due(3));
        assert!(due(6));
    }

    #[test]
    fn disconnect_while_pending_keeps_first_instant() {
        let (c, _) = coordinator();
        let t0 = Utc::now();
        c.on_connection_status(ConnectionStatus::ConnectionLost, t0);
        c.on_connection_status(ConnectionStatus::Connected, t0 + Duration::seconds(5));
        let t = c
            .on_connection_status(ConnectionStatus::ConnectionLost, t0 + Duration::seconds(8))
            .unwrap();
        assert_eq!(t.from, RecoveryState::ReconnectedRecoveryPending);
        assert_eq!(t.to, RecoveryState::DisconnectFailClosed);
        assert_eq!(c.status().disconnect_first_at, Some(t0));
    }

    #[test]
    fn invariant_guard_forces_fail_closed() {
        let (c, sink) = coordinator();
        let now = Utc::now();
        c.inner.lock().connection = Some(ConnectionStatus::Disconnected);
        assert!(!c.execution_allowed(now));
        assert_eq!(c.state(), RecoveryState::DisconnectFailClosed);
        assert_eq!(
            sink.kinds.lock().as_slice(),
            ["EXECUTION_GATE_INVARIANT_VIOLATION"]
        );
    }
}
