//! Bar admission pipeline and rejection statistics.
//!
//! Order: future-bar check, trading date locked, rollover, session window,
//! then delivery to matching streams. Rejections feed per-instrument counters
//! that drive the continuous-rejection signal and the periodic rate report;
//! they never affect correctness.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{EngineState, RobotEngine};
use crate::domain::bar::{Bar, BarRejectionReason, SessionWindow};
use crate::domain::critical::CriticalEventKind;
use crate::domain::shared::{InstrumentId, TradingDate};
use crate::infrastructure::metrics;

/// What happened to one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarDisposition {
    /// Admitted and handed to `delivered` streams.
    Accepted {
        /// Streams that received the bar.
        delivered: usize,
    },
    /// Refused by the pipeline.
    Rejected(BarRejectionReason),
    /// Engine not running.
    Ignored,
}

// ============================================================================
// Rejection statistics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    accepted: u64,
    future_bar: u64,
    no_trading_date: u64,
    outside_session: u64,
}

impl Counts {
    fn slot(&mut self, reason: BarRejectionReason) -> &mut u64 {
        match reason {
            BarRejectionReason::FutureBar => &mut self.future_bar,
            BarRejectionReason::NoTradingDate => &mut self.no_trading_date,
            BarRejectionReason::OutsideSession => &mut self.outside_session,
        }
    }

    const fn get(&self, reason: BarRejectionReason) -> u64 {
        match reason {
            BarRejectionReason::FutureBar => self.future_bar,
            BarRejectionReason::NoTradingDate => self.no_trading_date,
            BarRejectionReason::OutsideSession => self.outside_session,
        }
    }

    const fn rejected(&self) -> u64 {
        self.future_bar + self.no_trading_date + self.outside_session
    }

    const fn total(&self) -> u64 {
        self.accepted + self.rejected()
    }
}

#[derive(Debug, Default)]
struct InstrumentStats {
    window: Counts,
    lifetime: Counts,
    consecutive: Counts,
}

/// Rejection summary of one instrument for one report window.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentRejectionReport {
    /// Instrument.
    pub instrument: InstrumentId,
    /// Bars accepted in the window.
    pub accepted: u64,
    /// Bars rejected in the window, by reason.
    pub rejected: Vec<(BarRejectionReason, u64)>,
    /// Rejected share of processed bars in the window.
    pub rejection_rate: f64,
    /// Bars processed since start.
    pub lifetime_total: u64,
    /// Bars rejected since start.
    pub lifetime_rejected: u64,
}

impl InstrumentRejectionReport {
    /// Bars processed in the window.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.accepted + self.rejected.iter().map(|(_, n)| n).sum::<u64>()
    }
}

/// Per-instrument bar counters.
#[derive(Debug, Default)]
pub struct BarRejectionStats {
    instruments: HashMap<InstrumentId, InstrumentStats>,
    window_started_at: Option<DateTime<Utc>>,
}

impl BarRejectionStats {
    /// Count an accepted bar and reset the consecutive-rejection counters.
    pub fn record_accept(&mut self, instrument: &InstrumentId) {
        let stats = self.instruments.entry(instrument.clone()).or_default();
        stats.window.accepted += 1;
        stats.lifetime.accepted += 1;
        stats.consecutive = Counts::default();
    }

    /// Count a rejected bar. Returns the consecutive count when it reached
    /// `threshold` or a further multiple of it.
    pub fn record_reject(
        &mut self,
        instrument: &InstrumentId,
        reason: BarRejectionReason,
        threshold: Option<u32>,
    ) -> Option<u64> {
        let stats = self.instruments.entry(instrument.clone()).or_default();
        *stats.window.slot(reason) += 1;
        *stats.lifetime.slot(reason) += 1;
        let consecutive = stats.consecutive.slot(reason);
        *consecutive += 1;
        let count = *consecutive;
        threshold
            .map(u64::from)
            .filter(|t| *t > 0 && count % t == 0)
            .map(|_| count)
    }

    /// Close the report window once `interval` has elapsed. The first call
    /// only opens the window.
    pub fn take_report(
        &mut self,
        now: DateTime<Utc>,
        interval: chrono::Duration,
    ) -> Option<Vec<InstrumentRejectionReport>> {
        let Some(started) = self.window_started_at else {
            self.window_started_at = Some(now);
            return None;
        };
        if now - started < interval {
            return None;
        }
        self.window_started_at = Some(now);

        let mut reports: Vec<InstrumentRejectionReport> = self
            .instruments
            .iter_mut()
            .filter(|(_, s)| s.window.total() > 0)
            .map(|(instrument, stats)| {
                let window = std::mem::take(&mut stats.window);
                #[allow(clippy::cast_precision_loss)]
                let rejection_rate = window.rejected() as f64 / window.total() as f64;
                InstrumentRejectionReport {
                    instrument: instrument.clone(),
                    accepted: window.accepted,
                    rejected: BarRejectionReason::ALL
                        .iter()
                        .map(|r| (*r, window.get(*r)))
                        .filter(|(_, n)| *n > 0)
                        .collect(),
                    rejection_rate,
                    lifetime_total: stats.lifetime.total(),
                    lifetime_rejected: stats.lifetime.rejected(),
                }
            })
            .collect();
        reports.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        Some(reports)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

impl RobotEngine {
    /// Run one bar through the admission pipeline.
    pub async fn on_bar(&self, bar: &Bar, now: DateTime<Utc>) -> BarDisposition {
        let mut state = self.state.lock().await;
        if !state.running {
            return BarDisposition::Ignored;
        }

        let disposition = match self.admit_bar(&mut state, bar, now) {
            Ok(()) => {
                state.bar_stats.record_accept(&bar.instrument);
                metrics::record_bar_accepted(&bar.instrument);
                self.deps.health.record_bar(&bar.instrument, now);

                let mut delivered = 0;
                if let Some(session) = state.session.as_mut() {
                    for entry in session.streams.armed_on_instrument(&bar.instrument) {
                        entry.workflow.on_bar(bar, now);
                        delivered += 1;
                    }
                }
                BarDisposition::Accepted { delivered }
            }
            Err(reason) => {
                self.record_rejection(&mut state, bar, reason, now);
                BarDisposition::Rejected(reason)
            }
        };

        self.maybe_report(&mut state, now);
        disposition
    }

    fn admit_bar(
        &self,
        state: &mut EngineState,
        bar: &Bar,
        now: DateTime<Utc>,
    ) -> Result<(), BarRejectionReason> {
        if bar.timestamp - now > self.config.future_bar_tolerance() {
            return Err(BarRejectionReason::FutureBar);
        }

        if state.session.is_none() {
            return Err(BarRejectionReason::NoTradingDate);
        }

        self.roll_trading_date(state, bar, now);
        let Some(session) = state.session.as_ref() else {
            return Err(BarRejectionReason::NoTradingDate);
        };

        let window = self.session_window(&bar.instrument, session.trading_date);
        if !window.is_some_and(|w| w.contains(bar.timestamp)) {
            return Err(BarRejectionReason::OutsideSession);
        }
        Ok(())
    }

    /// `[prior day session start, trading date market close)` in the
    /// supported timezone. `None` when either end does not exist locally.
    fn session_window(&self, instrument: &InstrumentId, trading_date: TradingDate) -> Option<SessionWindow> {
        let spec = &self.deps.spec;
        let calendar = &self.deps.calendar;
        let start_time = spec.session_start_time(instrument, self.default_session_start);
        let start = calendar.to_utc(trading_date.previous_day(), start_time)?;
        let end = calendar.to_utc(trading_date.date(), spec.market_close_time())?;
        Some(SessionWindow::new(start, end))
    }

    /// Roll the trading date forward when the bar's civil date is later.
    ///
    /// In replay, a bar dated neither the trading date nor its prior day
    /// after the roll means the feed and the engine disagree; the engine
    /// stands down.
    fn roll_trading_date(&self, state: &mut EngineState, bar: &Bar, now: DateTime<Utc>) {
        let bar_date = self.deps.calendar.civil_date(bar.timestamp);
        let Some(session) = state.session.as_mut() else {
            return;
        };

        if bar_date > session.trading_date.date() {
            let previous = session.trading_date;
            let next = TradingDate::new(bar_date);
            session.trading_date = next;
            session.mismatch_reported = None;
            for entry in session.streams.entries_mut() {
                entry.workflow.update_trading_date(next, now);
            }
            tracing::info!(
                from = %previous,
                to = %next,
                instrument = %bar.instrument,
                "Trading day rollover"
            );
            self.emit(
                self.event("TRADING_DAY_ROLLOVER", now, Some(next))
                    .with_instrument(&bar.instrument)
                    .with_data(serde_json::json!({
                        "from": previous.to_string(),
                        "to": next.to_string(),
                        "bar_time": bar.timestamp.to_rfc3339(),
                    })),
            );
        }

        if !session.replay {
            return;
        }
        let engine_date = session.trading_date;
        if bar_date == engine_date.date() || bar_date == engine_date.previous_day() {
            return;
        }

        let message = format!(
            "Replay bar for {} at {} has civil date {bar_date}, engine trading date is {engine_date}.",
            bar.instrument,
            bar.timestamp.to_rfc3339()
        );
        self.deps.health.alerts().report_critical_kind(
            CriticalEventKind::TradingDateInvariantViolation,
            self.scope(),
            &message,
            now,
        );
        self.stand_down(
            state,
            "TRADING_DATE_INVARIANT_VIOLATION",
            serde_json::json!({
                "bar_date": bar_date.to_string(),
                "engine_date": engine_date.to_string(),
                "instrument": bar.instrument.as_str(),
            }),
            now,
        );
    }

    fn record_rejection(
        &self,
        state: &mut EngineState,
        bar: &Bar,
        reason: BarRejectionReason,
        now: DateTime<Utc>,
    ) {
        metrics::record_bar_rejected(&bar.instrument, reason);
        tracing::debug!(
            instrument = %bar.instrument,
            bar_time = %bar.timestamp,
            reason = reason.as_str(),
            "Bar rejected"
        );

        let threshold = match reason {
            BarRejectionReason::FutureBar => Some(self.config.future_bar_rejection_threshold),
            BarRejectionReason::NoTradingDate => Some(self.config.pre_lock_rejection_threshold),
            BarRejectionReason::OutsideSession => None,
        };
        let Some(consecutive) = state.bar_stats.record_reject(&bar.instrument, reason, threshold)
        else {
            return;
        };

        tracing::warn!(
            instrument = %bar.instrument,
            reason = reason.as_str(),
            consecutive,
            "Bars rejected continuously"
        );
        let trading_date = state.session.as_ref().map(|s| s.trading_date);
        self.emit(
            self.event("BAR_REJECTION_CONTINUOUS", now, trading_date)
                .with_instrument(&bar.instrument)
                .with_data(serde_json::json!({
                    "reason": reason.as_str(),
                    "consecutive": consecutive,
                    "bar_time": bar.timestamp.to_rfc3339(),
                    "engine_time": now.to_rfc3339(),
                })),
        );
    }

    fn maybe_report(&self, state: &mut EngineState, now: DateTime<Utc>) {
        let Some(reports) = state
            .bar_stats
            .take_report(now, self.config.rejection_report_interval())
        else {
            return;
        };
        let trading_date = state.session.as_ref().map(|s| s.trading_date);

        for report in reports {
            let by_reason: serde_json::Map<String, serde_json::Value> = report
                .rejected
                .iter()
                .map(|(r, n)| (r.as_str().to_string(), (*n).into()))
                .collect();
            tracing::info!(
                instrument = %report.instrument,
                accepted = report.accepted,
                total = report.total(),
                rejection_rate = report.rejection_rate,
                lifetime_total = report.lifetime_total,
                lifetime_rejected = report.lifetime_rejected,
                "Bar rejection report"
            );

            if report.total() >= self.config.rejection_rate_min_bars
                && report.rejection_rate > self.config.rejection_rate_alert
            {
                tracing::error!(
                    instrument = %report.instrument,
                    rejection_rate = report.rejection_rate,
                    total = report.total(),
                    "Bar rejection rate high"
                );
                self.emit(
                    self.event("BAR_REJECTION_RATE_HIGH", now, trading_date)
                        .with_instrument(&report.instrument)
                        .with_data(serde_json::json!({
                            "rejection_rate": report.rejection_rate,
                            "total": report.total(),
                            "accepted": report.accepted,
                            "rejected": by_reason,
                        })),
                );
            }
        }
    }
}
