//! Engine Orchestrator
//!
//! Owns trading-date locking, timetable ingestion, the bar admission
//! pipeline and the stream registry, and drives disconnect recovery from the
//! tick path.
//!
//! # Locking
//!
//! Every entrypoint that touches the trading session is serialized by one
//! `tokio::sync::Mutex`. Timetable and journal reads happen before the lock
//! is taken; the result is validated and applied under it. The recovery
//! account snapshot is the one await made while holding the lock, and it is
//! bounded by a timeout.
//!
//! ```text
//!  tick ──► record liveness ──► recovery gate/runner ──► timetable poll? ──► tick streams
//!                                     │ (gate closed)          │
//!                                     └──► return              └─ read outside lock, apply inside
//! ```

mod bars;
mod registry;
mod timetable;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::Mutex;

pub use bars::{BarDisposition, BarRejectionStats, InstrumentRejectionReport};

use crate::application::health::{CriticalScope, HealthMonitor};
use crate::application::ports::{
    ActiveStreamsProbe, EventSink, ExecutionAdapter, JournalReader, RobotEvent, StreamFactory,
    TimetableSource, TradingCalendar,
};
use crate::application::recovery::{GateDecision, RecoveryCoordinator, RecoveryRunOutcome};
use crate::config::{ConfigError, EngineConfig, RobotConfig};
use crate::domain::critical::CriticalEventKind;
use crate::domain::mode::ExecutionMode;
use crate::domain::recovery::{ConnectionStatus, RecoveryState};
use crate::domain::shared::{RunId, StreamId, TradingDate};
use crate::domain::trading_spec::TradingSpec;
use crate::error::EngineError;
use crate::infrastructure::metrics;
use registry::StreamRegistry;

/// Collaborators of the engine.
#[derive(Clone)]
pub struct EngineDeps {
    /// Validated trading specification.
    pub spec: Arc<TradingSpec>,
    /// Civil calendar of the supported timezone.
    pub calendar: Arc<dyn TradingCalendar>,
    /// Timetable source.
    pub timetable: Arc<dyn TimetableSource>,
    /// Journal reader.
    pub journal: Arc<dyn JournalReader>,
    /// Stream factory.
    pub streams: Arc<dyn StreamFactory>,
    /// Broker account access for recovery.
    pub execution: Arc<dyn ExecutionAdapter>,
    /// Structured event log.
    pub events: Arc<dyn EventSink>,
    /// Health monitor.
    pub health: Arc<HealthMonitor>,
    /// Published activity snapshot, also handed to the health monitor.
    pub activity: Arc<StreamActivity>,
}

/// Whether any stream is in an active trading state, as of the last tick.
#[derive(Debug, Default)]
pub struct StreamActivity {
    active: AtomicBool,
}

impl StreamActivity {
    /// Create an inactive snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

impl ActiveStreamsProbe for StreamActivity {
    fn has_active_streams(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Trading date and the streams that belong to it. They only exist together.
struct TradingSession {
    trading_date: TradingDate,
    replay: bool,
    streams: StreamRegistry,
    /// (stream, reason) pairs already reported, so each is logged once.
    reported: HashSet<(StreamId, &'static str)>,
    /// Last mismatched timetable date reported.
    mismatch_reported: Option<TradingDate>,
}

impl TradingSession {
    fn new(trading_date: TradingDate, replay: bool) -> Self {
        Self {
            trading_date,
            replay,
            streams: StreamRegistry::default(),
            reported: HashSet::new(),
            mismatch_reported: None,
        }
    }

    /// Record `(stream, reason)`; true the first time.
    fn first_report(&mut self, stream: &StreamId, reason: &'static str) -> bool {
        self.reported.insert((stream.clone(), reason))
    }
}

#[derive(Default)]
struct EngineState {
    running: bool,
    session: Option<TradingSession>,
    last_timetable_poll_at: Option<DateTime<Utc>>,
    last_stand_down: Option<&'static str>,
    bar_stats: BarRejectionStats,
}

/// Streams already registered when a poll was reserved; their journal
/// records are not prefetched.
struct PollReservation {
    known: HashSet<StreamId>,
}

/// The orchestrator.
pub struct RobotEngine {
    config: EngineConfig,
    mode: ExecutionMode,
    run_id: RunId,
    default_session_start: NaiveTime,
    deps: EngineDeps,
    recovery: Arc<RecoveryCoordinator>,
    state: Mutex<EngineState>,
}

impl RobotEngine {
    /// Build an engine for one run.
    ///
    /// # Errors
    ///
    /// Returns an error if the default session start time is not `HH:MM`.
    pub fn new(config: &RobotConfig, run_id: RunId, deps: EngineDeps) -> Result<Self, EngineError> {
        let default_session_start = config.engine.default_session_start().ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "engine.default_session_start_time '{}' is not HH:MM",
                config.engine.default_session_start_time
            ))
        })?;

        let recovery = Arc::new(RecoveryCoordinator::new(
            config.recovery.clone(),
            run_id.clone(),
            Arc::clone(deps.health.alerts()),
        ));

        Ok(Self {
            config: config.engine.clone(),
            mode: config.environment.mode,
            run_id,
            default_session_start,
            deps,
            recovery,
            state: Mutex::new(EngineState::default()),
        })
    }

    /// Run identifier.
    #[must_use]
    pub const fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Recovery coordinator, for the execution gate.
    #[must_use]
    pub const fn recovery(&self) -> &Arc<RecoveryCoordinator> {
        &self.recovery
    }

    /// Current recovery state.
    #[must_use]
    pub fn recovery_state(&self) -> RecoveryState {
        self.recovery.state()
    }

    /// Whether order placement is permitted. Synchronous, fails closed.
    #[must_use]
    pub fn execution_allowed(&self, now: DateTime<Utc>) -> bool {
        self.recovery.execution_allowed(now)
    }

    /// Locked trading date, if any.
    pub async fn trading_date(&self) -> Option<TradingDate> {
        self.state.lock().await.session.as_ref().map(|s| s.trading_date)
    }

    /// Registered stream ids, in id order.
    pub async fn stream_ids(&self) -> Vec<StreamId> {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.streams.ids())
            .unwrap_or_default()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the engine and force a timetable load.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ExecutionModeNotAuthorized`] when configured for
    /// a mode that may not trade. An emergency notification is sent first.
    pub async fn start(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if !self.mode.is_authorized() {
            tracing::error!(mode = %self.mode, "Execution mode not authorized; refusing to start");
            self.deps.health.alerts().report_critical_kind(
                CriticalEventKind::ExecutionModeNotAuthorized,
                self.scope(),
                &format!("Engine start refused: execution mode {} is not authorized.", self.mode),
                now,
            );
            self.emit(
                self.event("ENGINE_START_REFUSED", now, None)
                    .with_data(serde_json::json!({ "mode": self.mode.to_string() })),
            );
            return Err(EngineError::ExecutionModeNotAuthorized { mode: self.mode });
        }

        {
            let mut state = self.state.lock().await;
            state.running = true;
            state.last_timetable_poll_at = None;
        }
        tracing::info!(run_id = %self.run_id, mode = %self.mode, "Engine started");
        self.emit(self.event("ENGINE_START", now, None).with_data(serde_json::json!({
            "run_id": self.run_id.as_str(),
            "mode": self.mode.to_string(),
        })));

        self.force_timetable_reload(now).await;
        Ok(())
    }

    /// Stop the engine and drop the trading session.
    pub async fn stop(&self, now: DateTime<Utc>) {
        let trading_date = {
            let mut state = self.state.lock().await;
            state.running = false;
            let date = state.session.take().map(|s| s.trading_date);
            self.deps.activity.publish(false);
            metrics::set_streams(0);
            date
        };
        tracing::info!(run_id = %self.run_id, "Engine stopped");
        self.emit(self.event("ENGINE_STOP", now, trading_date));
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Periodic processing.
    pub async fn tick(&self, now: DateTime<Utc>) {
        self.deps.health.record_tick(now);

        let reservation = {
            let mut state = self.state.lock().await;
            if !state.running {
                return;
            }
            if !self.drive_recovery(&mut state, now).await {
                return;
            }
            self.reserve_poll(&mut state, now, false)
        };

        if let Some(reservation) = reservation {
            self.poll_timetable(reservation, now).await;
        }

        let mut state = self.state.lock().await;
        if !state.running {
            return;
        }
        if let Some(session) = state.session.as_mut() {
            for entry in session.streams.armed_mut() {
                entry.workflow.tick(now);
            }
        }
        self.publish_activity(&state);
    }

    /// Read and apply the timetable now, regardless of the poll interval.
    pub async fn force_timetable_reload(&self, now: DateTime<Utc>) {
        let reservation = {
            let mut state = self.state.lock().await;
            if !state.running {
                return;
            }
            self.reserve_poll(&mut state, now, true)
        };
        if let Some(reservation) = reservation {
            self.poll_timetable(reservation, now).await;
        }
    }

    fn reserve_poll(
        &self,
        state: &mut EngineState,
        now: DateTime<Utc>,
        force: bool,
    ) -> Option<PollReservation> {
        let due = force
            || state
                .last_timetable_poll_at
                .is_none_or(|last| now - last >= self.config.timetable_poll_interval());
        if !due {
            return None;
        }
        state.last_timetable_poll_at = Some(now);
        self.deps.health.record_timetable_poll(now);
        let known = state
            .session
            .as_ref()
            .map(|s| s.streams.ids().into_iter().collect())
            .unwrap_or_default();
        Some(PollReservation { known })
    }

    /// Returns `false` while the broker synchronization gate is closed, in
    /// which case the rest of the tick is skipped.
    async fn drive_recovery(&self, state: &mut EngineState, now: DateTime<Utc>) -> bool {
        match self.recovery.gate(now) {
            GateDecision::Waiting {
                reason,
                diagnostic_due,
            } => {
                if diagnostic_due {
                    self.emit(
                        self.event("RECOVERY_PENDING", now, session_date(state))
                            .with_state(RecoveryState::ReconnectedRecoveryPending.as_str())
                            .with_data(serde_json::json!({ "waiting_for": reason.as_str() })),
                    );
                }
                return false;
            }
            GateDecision::Ready => {
                self.emit(
                    self.event("RECOVERY_STARTED", now, session_date(state))
                        .with_state(RecoveryState::RecoveryRunning.as_str()),
                );
            }
            GateDecision::NotPending => {}
        }

        if self.recovery.state() != RecoveryState::RecoveryRunning {
            return true;
        }

        let trading_date = session_date(state);
        let mut streams = state
            .session
            .as_mut()
            .map(|s| s.streams.recovery_streams())
            .unwrap_or_default();
        let run = self
            .recovery
            .run(self.deps.execution.as_ref(), &mut streams, now)
            .await;
        drop(streams);

        if run.outcome.is_attempt() && !run.repeated {
            self.emit(
                self.event("RECOVERY_RUN", now, trading_date)
                    .with_state(self.recovery.state().as_str())
                    .with_data(recovery_outcome_data(&run.outcome)),
            );
        }
        true
    }

    // ========================================================================
    // Connectivity
    // ========================================================================

    /// Broker connection status changed.
    pub fn on_connection_status(&self, status: ConnectionStatus, now: DateTime<Utc>) {
        self.deps.health.on_connection_status(status, now);
        if let Some(transition) = self.recovery.on_connection_status(status, now) {
            self.emit(
                self.event("RECOVERY_STATE_CHANGED", now, None)
                    .with_state(transition.to.as_str())
                    .with_data(serde_json::json!({
                        "from": transition.from.as_str(),
                        "to": transition.to.as_str(),
                        "connection": format!("{status:?}"),
                    })),
            );
        }
    }

    /// The broker reported an order update.
    pub fn on_order_update(&self, now: DateTime<Utc>) {
        self.recovery.on_order_update(now);
    }

    /// The broker reported an execution update.
    pub fn on_execution_update(&self, now: DateTime<Utc>) {
        self.recovery.on_execution_update(now);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn scope(&self) -> CriticalScope<'_> {
        CriticalScope {
            run_id: Some(&self.run_id),
            trading_date: None,
        }
    }

    fn event(&self, event_type: &str, now: DateTime<Utc>, trading_date: Option<TradingDate>) -> RobotEvent {
        RobotEvent::engine(event_type, now, self.deps.calendar.local_rfc3339(now))
            .with_trading_date(trading_date)
    }

    fn emit(&self, event: RobotEvent) {
        self.deps.events.emit(event);
    }

    fn publish_activity(&self, state: &EngineState) {
        let active = state
            .session
            .as_ref()
            .is_some_and(|s| s.streams.has_active());
        self.deps.activity.publish(active);
    }

    /// Clear the trading session after a fail-closed validation failure.
    fn stand_down(
        &self,
        state: &mut EngineState,
        reason: &'static str,
        detail: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        let previous = state.session.take();
        let had_session = previous.is_some();
        let repeated = state.last_stand_down == Some(reason);
        state.last_stand_down = Some(reason);
        self.deps.activity.publish(false);
        metrics::set_streams(0);

        if had_session || !repeated {
            metrics::record_stand_down(reason);
            tracing::error!(
                reason,
                detail = %detail,
                streams_cleared = previous.as_ref().map_or(0, |s| s.streams.len()),
                "Stand-down: trading date and streams cleared"
            );
            self.emit(
                self.event("STAND_DOWN", now, previous.as_ref().map(|s| s.trading_date))
                    .with_data(serde_json::json!({ "reason": reason, "detail": detail })),
            );
        }
    }
}

impl std::fmt::Debug for RobotEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotEngine")
            .field("run_id", &self.run_id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

fn session_date(state: &EngineState) -> Option<TradingDate> {
    state.session.as_ref().map(|s| s.trading_date)
}

fn recovery_outcome_data(outcome: &RecoveryRunOutcome) -> serde_json::Value {
    fn names<T: AsRef<str>>(items: &[T]) -> serde_json::Value {
        items.iter().map(AsRef::as_ref).collect::<Vec<&str>>().into()
    }

    let mut data = serde_json::Map::new();
    data.insert("outcome".into(), outcome.as_str().into());
    match outcome {
        RecoveryRunOutcome::SnapshotFailed(e) | RecoveryRunOutcome::CancelFailed(e) => {
            data.insert("error".into(), e.to_string().into());
        }
        RecoveryRunOutcome::UnmatchedPositions(instruments) => {
            data.insert("instruments".into(), names(instruments));
        }
        RecoveryRunOutcome::Incomplete {
            unprotected,
            unreconciled,
        } => {
            data.insert("unprotected".into(), names(unprotected));
            data.insert("unreconciled".into(), names(unreconciled));
        }
        RecoveryRunOutcome::Completed {
            cancelled,
            protected,
            reconciled,
        } => {
            data.insert("cancelled".into(), (*cancelled).into());
            data.insert("protected".into(), (*protected).into());
            data.insert("reconciled".into(), (*reconciled).into());
        }
        RecoveryRunOutcome::NotEligible
        | RecoveryRunOutcome::AlreadyRunning
        | RecoveryRunOutcome::Aborted => {}
    }
    serde_json::Value::Object(data)
}
