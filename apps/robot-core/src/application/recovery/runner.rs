//! Recovery runner: reconciles broker state once the gate has passed.
//!
//! Steps, in order: snapshot the account, match every open position to a
//! stream, cancel robot-owned working orders, protect matched positions,
//! rebuild working orders of range-locked streams. Every step is safe to
//! repeat; a blocked or failed run is simply re-run on a later tick.
//!
//! A blocked outcome that repeats the last reported one is logged again only
//! once the report interval has passed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use super::RecoveryCoordinator;
use crate::application::ports::{ExecutionAdapter, ExecutionError, StreamWorkflow};
use crate::domain::critical::CriticalEventKind;
use crate::domain::recovery::RecoveryState;
use crate::domain::shared::{InstrumentId, StreamId};
use crate::domain::stream::{RecoveryManageReason, StreamState};
use crate::infrastructure::metrics;

/// A registered stream as the runner sees it.
pub struct RecoveryStream<'a> {
    /// The stream's workflow.
    pub workflow: &'a mut dyn StreamWorkflow,
    /// Committed according to the workflow or the journal.
    pub committed: bool,
}

/// Result of one runner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryRunOutcome {
    /// Not in `RECOVERY_RUNNING`, or waiting out the retry interval.
    NotEligible,
    /// Another run holds the re-entrancy guard.
    AlreadyRunning,
    /// A disconnect interrupted the run.
    Aborted,
    /// Account snapshot failed or timed out; retried on the next tick.
    SnapshotFailed(ExecutionError),
    /// Open positions with no stream on their instrument. Hard stop.
    UnmatchedPositions(Vec<InstrumentId>),
    /// Cancelling robot-owned orders failed; retried later.
    CancelFailed(ExecutionError),
    /// Some positions or streams were not confirmed; retried later.
    Incomplete {
        /// Matched positions no stream confirmed protection for.
        unprotected: Vec<InstrumentId>,
        /// Range-locked streams that did not confirm their orders.
        unreconciled: Vec<StreamId>,
    },
    /// Reconciliation finished; state is `RECOVERY_COMPLETE`.
    Completed {
        /// Robot-owned orders cancelled.
        cancelled: usize,
        /// Positions protected.
        protected: usize,
        /// Range-locked streams reconciled.
        reconciled: usize,
    },
}

impl RecoveryRunOutcome {
    /// Label used in metrics and events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotEligible => "not_eligible",
            Self::AlreadyRunning => "already_running",
            Self::Aborted => "aborted",
            Self::SnapshotFailed(_) => "snapshot_failed",
            Self::UnmatchedPositions(_) => "unmatched_positions",
            Self::CancelFailed(_) => "cancel_failed",
            Self::Incomplete { .. } => "incomplete",
            Self::Completed { .. } => "completed",
        }
    }

    /// Outcomes that leave recovery running and are retried later.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(
            self,
            Self::SnapshotFailed(_)
                | Self::UnmatchedPositions(_)
                | Self::CancelFailed(_)
                | Self::Incomplete { .. }
        )
    }

    /// Whether the runner actually got to work.
    #[must_use]
    pub const fn is_attempt(&self) -> bool {
        !matches!(self, Self::NotEligible | Self::AlreadyRunning)
    }
}

/// One runner invocation as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRun {
    /// What happened.
    pub outcome: RecoveryRunOutcome,
    /// Set when the outcome repeats the last reported blocked outcome
    /// inside the report interval. Repeats are not logged.
    pub repeated: bool,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RecoveryCoordinator {
    /// Whether a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run reconciliation once. Safe to call redundantly.
    pub async fn run(
        &self,
        adapter: &dyn ExecutionAdapter,
        streams: &mut [RecoveryStream<'_>],
        now: DateTime<Utc>,
    ) -> RecoveryRun {
        let outcome = self.run_inner(adapter, streams, now).await;
        let repeated = outcome.is_attempt() && self.repeats_last_report(&outcome, now);
        if outcome.is_attempt() {
            metrics::record_recovery_run(outcome.as_str());
        }
        if !repeated {
            log_blocked(&outcome);
        }
        RecoveryRun { outcome, repeated }
    }

    fn repeats_last_report(&self, outcome: &RecoveryRunOutcome, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();
        if !outcome.is_blocked() {
            inner.last_blocked_report = None;
            return false;
        }
        let interval = self.config.run_report_interval();
        if let Some((last, at)) = &inner.last_blocked_report
            && last == outcome
            && now - *at < interval
        {
            return true;
        }
        inner.last_blocked_report = Some((outcome.clone(), now));
        false
    }

    async fn run_inner(
        &self,
        adapter: &dyn ExecutionAdapter,
        streams: &mut [RecoveryStream<'_>],
        now: DateTime<Utc>,
    ) -> RecoveryRunOutcome {
        let seq = {
            let inner = self.inner.lock();
            if inner.state != RecoveryState::RecoveryRunning {
                return RecoveryRunOutcome::NotEligible;
            }
            if inner.next_retry_at.is_some_and(|at| now < at) {
                return RecoveryRunOutcome::NotEligible;
            }
            inner.disconnect_seq
        };

        let Ok(_lock) = self.run_lock.try_lock() else {
            return RecoveryRunOutcome::AlreadyRunning;
        };
        if self.running.swap(true, Ordering::AcqRel) {
            return RecoveryRunOutcome::AlreadyRunning;
        }
        let _guard = RunGuard(&self.running);

        if self.interrupted(seq) {
            return RecoveryRunOutcome::Aborted;
        }

        // Step A
        let timeout = self.config.snapshot_timeout();
        let snapshot = match tokio::time::timeout(timeout, adapter.get_account_snapshot(now)).await
        {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => return RecoveryRunOutcome::SnapshotFailed(e),
            Err(_) => {
                return RecoveryRunOutcome::SnapshotFailed(ExecutionError::Timeout {
                    timeout_ms: self.config.snapshot_timeout_ms,
                });
            }
        };
        if self.interrupted(seq) {
            return RecoveryRunOutcome::Aborted;
        }

        // Step B
        let mut unmatched: Vec<InstrumentId> = {
            let known: HashSet<&InstrumentId> =
                streams.iter().map(|s| s.workflow.instrument()).collect();
            snapshot
                .open_positions()
                .filter(|p| !known.contains(&p.instrument))
                .map(|p| p.instrument.clone())
                .collect()
        };
        if !unmatched.is_empty() {
            unmatched.sort();
            unmatched.dedup();
            let names: Vec<&str> = unmatched.iter().map(InstrumentId::as_str).collect();
            self.report(
                CriticalEventKind::RecoveryPositionUnmatched,
                &format!(
                    "Open positions without a matching stream: {}. Execution stays blocked until they are flattened.",
                    names.join(", ")
                ),
                now,
            );
            self.schedule_retry(now);
            return RecoveryRunOutcome::UnmatchedPositions(unmatched);
        }

        // Step C
        let owned = snapshot.robot_owned_orders(&self.config.robot_order_prefix);
        let cancelled = if owned.is_empty() {
            0
        } else {
            match tokio::time::timeout(
                timeout,
                adapter.cancel_robot_owned_working_orders(&owned, now),
            )
            .await
            {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    self.schedule_retry(now);
                    return RecoveryRunOutcome::CancelFailed(e);
                }
                Err(_) => {
                    self.schedule_retry(now);
                    return RecoveryRunOutcome::CancelFailed(ExecutionError::Timeout {
                        timeout_ms: self.config.snapshot_timeout_ms,
                    });
                }
            }
        };
        let skipped = snapshot.working_orders.len() - owned.len();
        tracing::info!(cancelled, skipped_foreign = skipped, "Robot-owned working orders cancelled");
        if self.interrupted(seq) {
            return RecoveryRunOutcome::Aborted;
        }

        // Step D: every stream on the instrument, committed or not
        let mut protected = 0;
        let mut unprotected = Vec::new();
        for position in snapshot.open_positions() {
            let mut confirmed = false;
            for stream in streams
                .iter_mut()
                .filter(|s| s.workflow.instrument() == &position.instrument)
            {
                confirmed |= stream
                    .workflow
                    .enter_recovery_manage(now, RecoveryManageReason::ProtectPosition);
            }
            if confirmed {
                protected += 1;
            } else {
                unprotected.push(position.instrument.clone());
            }
        }

        // Step E
        let mut reconciled = 0;
        let mut unreconciled = Vec::new();
        for stream in streams
            .iter_mut()
            .filter(|s| !s.committed && s.workflow.state() == StreamState::RangeLocked)
        {
            if stream
                .workflow
                .enter_recovery_manage(now, RecoveryManageReason::RebuildWorkingOrders)
            {
                reconciled += 1;
            } else {
                unreconciled.push(stream.workflow.stream_id().clone());
            }
        }

        if !unprotected.is_empty() || !unreconciled.is_empty() {
            self.schedule_retry(now);
            return RecoveryRunOutcome::Incomplete {
                unprotected,
                unreconciled,
            };
        }

        {
            let mut inner = self.inner.lock();
            if inner.state != RecoveryState::RecoveryRunning || inner.disconnect_seq != seq {
                return RecoveryRunOutcome::Aborted;
            }
            inner.recovery_completed_at = Some(now);
            inner.next_retry_at = None;
            inner.last_blocked_report = None;
            inner.set_state(RecoveryState::RecoveryComplete);
        }
        tracing::info!(cancelled, protected, reconciled, "Recovery complete; execution allowed");

        RecoveryRunOutcome::Completed {
            cancelled,
            protected,
            reconciled,
        }
    }

    /// Whether a disconnect happened since `seq` was read. Falls back to
    /// fail-closed when the connection is not reported connected.
    fn interrupted(&self, seq: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.disconnect_seq != seq || inner.state != RecoveryState::RecoveryRunning {
            tracing::warn!("Recovery aborted: disconnect during run");
            return true;
        }
        if !inner.connection.is_some_and(|c| c.is_connected()) {
            inner.disconnect_seq += 1;
            inner.set_state(RecoveryState::DisconnectFailClosed);
            tracing::warn!("Recovery aborted: connection not reported connected");
            return true;
        }
        false
    }

    fn schedule_retry(&self, now: DateTime<Utc>) {
        self.inner.lock().next_retry_at = Some(now + self.config.retry_interval());
    }
}

fn log_blocked(outcome: &RecoveryRunOutcome) {
    match outcome {
        RecoveryRunOutcome::SnapshotFailed(e) => {
            tracing::warn!(error = %e, "Recovery snapshot failed; retrying next tick");
        }
        RecoveryRunOutcome::UnmatchedPositions(instruments) => {
            let names: Vec<&str> = instruments.iter().map(InstrumentId::as_str).collect();
            tracing::error!(
                instruments = ?names,
                "Recovery blocked: open positions with no matching stream; operator intervention required"
            );
        }
        RecoveryRunOutcome::CancelFailed(e) => {
            tracing::warn!(error = %e, "Cancelling robot-owned orders failed; retrying");
        }
        RecoveryRunOutcome::Incomplete {
            unprotected,
            unreconciled,
        } => {
            tracing::warn!(
                unprotected = unprotected.len(),
                unreconciled = unreconciled.len(),
                "Recovery incomplete; retrying"
            );
        }
        RecoveryRunOutcome::NotEligible
        | RecoveryRunOutcome::AlreadyRunning
        | RecoveryRunOutcome::Aborted
        | RecoveryRunOutcome::Completed { .. } => {}
    }
}
