//! Health monitor.
//!
//! Observes liveness signals (engine ticks, bars per instrument, timetable
//! polls, connection status) and drives deduplicated, rate-limited alerting.
//!
//! # Architecture
//!
//! ```text
//! RobotEngine ──record_tick/record_bar──► HealthMonitor ◄── spawn() loop
//!                                              │
//!                      ┌───────────────────────┼──────────────────────┐
//!                      ▼                       ▼                      ▼
//!          ConnectionLossCoordinator   ActiveStreamsProbe      AlertDispatcher
//!          (shared across monitors)    (session awareness)     (limiter, dedupe)
//!                                                                     │
//!                                                                     ▼
//!                                                            NotificationSink
//! ```
//!
//! Stall checks only run while at least one stream is in an active trading
//! state. The evaluation loop runs on its own task so stall detection keeps
//! working when the tick source itself stalls.

mod alerts;
mod connection;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use alerts::{
    AlertDispatcher, CriticalOutcome, CriticalScope, DEDUPE_SENTINEL, critical_dedupe_key,
};
pub use connection::{ConnectionLossCoordinator, SustainedLoss};

use crate::application::ports::{ActiveStreamsProbe, Notification, NotificationPriority};
use crate::config::HealthConfig;
use crate::domain::recovery::ConnectionStatus;
use crate::domain::shared::InstrumentId;

/// Notification kind of the engine tick stall alert.
pub const ENGINE_TICK_STALL: &str = "ENGINE_TICK_STALL";
/// Notification kind of the sustained connection loss alert.
pub const CONNECTION_LOST_SUSTAINED: &str = "CONNECTION_LOST_SUSTAINED";

/// What one evaluation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// No stream was active, stall checks were skipped.
    pub inactive: bool,
    /// A tick stall alert was raised in this evaluation.
    pub tick_stall_alerted: bool,
    /// A tick stall episode ended in this evaluation.
    pub tick_stall_cleared: bool,
    /// Instruments whose data stall was logged in this evaluation.
    pub data_stalls_logged: Vec<InstrumentId>,
    /// A sustained connection loss alert was raised in this evaluation.
    pub connection_loss_alerted: bool,
}

/// Last observed liveness signals.
#[derive(Debug, Clone, Default)]
pub struct LivenessSnapshot {
    /// Last engine tick.
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Last timetable poll.
    pub last_timetable_poll_at: Option<DateTime<Utc>>,
    /// Last bar per instrument.
    pub last_bar_at: HashMap<InstrumentId, DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MonitorState {
    liveness: LivenessSnapshot,
    tick_stall_active: bool,
    data_stall_logged_at: HashMap<InstrumentId, DateTime<Utc>>,
}

/// Liveness monitor with deduplicated alerting.
pub struct HealthMonitor {
    config: HealthConfig,
    alerts: Arc<AlertDispatcher>,
    connection: Arc<ConnectionLossCoordinator>,
    probe: Arc<dyn ActiveStreamsProbe>,
    state: Mutex<MonitorState>,
}

impl HealthMonitor {
    /// Create a monitor.
    #[must_use]
    pub fn new(
        config: HealthConfig,
        alerts: Arc<AlertDispatcher>,
        connection: Arc<ConnectionLossCoordinator>,
        probe: Arc<dyn ActiveStreamsProbe>,
    ) -> Self {
        Self {
            config,
            alerts,
            connection,
            probe,
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Alert dispatcher used by this monitor.
    #[must_use]
    pub fn alerts(&self) -> &Arc<AlertDispatcher> {
        &self.alerts
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Record an engine tick.
    pub fn record_tick(&self, now: DateTime<Utc>) {
        self.state.lock().liveness.last_tick_at = Some(now);
    }

    /// Record an accepted bar for an instrument.
    pub fn record_bar(&self, instrument: &InstrumentId, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.liveness.last_bar_at.insert(instrument.clone(), now);
        state.data_stall_logged_at.remove(instrument);
    }

    /// Record a timetable poll.
    pub fn record_timetable_poll(&self, now: DateTime<Utc>) {
        self.state.lock().liveness.last_timetable_poll_at = Some(now);
    }

    /// Forward a connection status change to the shared coordinator.
    pub fn on_connection_status(&self, status: ConnectionStatus, now: DateTime<Utc>) {
        self.connection.on_status(status, now);
    }

    /// Copy of the last observed signals.
    #[must_use]
    pub fn liveness(&self) -> LivenessSnapshot {
        self.state.lock().liveness.clone()
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluate every check once.
    pub fn evaluate(&self, now: DateTime<Utc>) -> HealthReport {
        let mut report = HealthReport::default();

        if let Some(loss) = self
            .connection
            .claim_sustained_loss(now, self.config.connection_loss_alert())
        {
            let lost_secs = (now - loss.since).num_seconds();
            tracing::error!(
                episode = loss.episode,
                lost_secs,
                "Broker connection lost for a sustained period"
            );
            self.alerts.send(
                Notification {
                    key: format!("{CONNECTION_LOST_SUSTAINED}:{}", loss.episode),
                    kind: CONNECTION_LOST_SUSTAINED.to_string(),
                    title: "Broker connection lost".to_string(),
                    message: format!(
                        "Broker connection lost for {lost_secs}s (since {}). Execution is blocked until recovery completes.",
                        loss.since.to_rfc3339()
                    ),
                    priority: NotificationPriority::Emergency,
                },
                now,
            );
            report.connection_loss_alerted = true;
        }

        if !self.probe.has_active_streams() {
            report.inactive = true;
            return report;
        }

        let mut state = self.state.lock();

        if let Some(last_tick) = state.liveness.last_tick_at {
            let elapsed = now - last_tick;
            if elapsed >= self.config.engine_tick_stall() {
                if !state.tick_stall_active {
                    state.tick_stall_active = true;
                    report.tick_stall_alerted = true;
                    tracing::error!(
                        stalled_secs = elapsed.num_seconds(),
                        "Engine tick stalled while streams are active"
                    );
                    self.alerts.send(
                        Notification {
                            key: ENGINE_TICK_STALL.to_string(),
                            kind: ENGINE_TICK_STALL.to_string(),
                            title: "Engine tick stalled".to_string(),
                            message: format!(
                                "No engine tick for {}s while streams are active (last tick {}).",
                                elapsed.num_seconds(),
                                last_tick.to_rfc3339()
                            ),
                            priority: NotificationPriority::Emergency,
                        },
                        now,
                    );
                }
            } else if state.tick_stall_active {
                state.tick_stall_active = false;
                report.tick_stall_cleared = true;
                tracing::info!("Engine tick resumed");
            }
        }

        let data_stall = self.config.data_stall();
        let log_interval = self.config.data_stall_log_interval();
        let stalled: Vec<(InstrumentId, DateTime<Utc>)> = state
            .liveness
            .last_bar_at
            .iter()
            .filter(|(_, last)| now - **last >= data_stall)
            .map(|(instrument, last)| (instrument.clone(), *last))
            .collect();

        for (instrument, last_bar) in stalled {
            let due = state
                .data_stall_logged_at
                .get(&instrument)
                .is_none_or(|logged| now - *logged >= log_interval);
            if !due {
                continue;
            }
            tracing::warn!(
                instrument = %instrument,
                stalled_secs = (now - last_bar).num_seconds(),
                "No bars received for instrument"
            );
            state.data_stall_logged_at.insert(instrument.clone(), now);
            report.data_stalls_logged.push(instrument);
        }

        report
    }

    /// Run the evaluation loop until `cancel` fires.
    ///
    /// A panicking evaluation is logged and the loop sleeps the configured
    /// backoff before continuing.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.evaluation_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            tracing::info!(
                evaluation_interval_secs = self.config.evaluation_interval_secs,
                tick_stall_secs = self.config.engine_tick_stall_secs,
                connection_loss_secs = self.config.connection_loss_alert_secs,
                "Health monitor started"
            );

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::info!("Health monitor shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let monitor = Arc::clone(&self);
                        let result = AssertUnwindSafe(async move { monitor.evaluate(Utc::now()) })
                            .catch_unwind()
                            .await;

                        if let Err(panic) = result {
                            tracing::error!(
                                panic = panic_message(panic.as_ref()),
                                backoff_secs = self.config.loop_backoff_secs,
                                "Health evaluation panicked"
                            );
                            tokio::select! {
                                () = cancel.cancelled() => break,
                                () = tokio::time::sleep(self.config.loop_backoff()) => {}
                            }
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
