//! Deduplicated, rate-limited alert dispatch.
//!
//! Every outbound notification passes through [`AlertDispatcher::send`]:
//! a per-key limiter drops repeats inside the configured interval unless the
//! notification is an emergency. Critical events additionally go through a
//! whitelist and a once-per-run dedupe set before reaching `send`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::application::ports::{Notification, NotificationPriority, NotificationSink};
use crate::domain::critical::CriticalEventKind;
use crate::domain::shared::{RunId, TradingDate};
use crate::infrastructure::metrics;

/// Dedupe scope used when neither a run id nor a trading date is known.
pub const DEDUPE_SENTINEL: &str = "NO_SCOPE";

static SENTINEL_WARNED: AtomicBool = AtomicBool::new(false);

/// Build the dedupe key for a critical event.
///
/// Preference: run id, then trading date, then [`DEDUPE_SENTINEL`]. The
/// sentinel means the caller passed no scope at all; the first time it is
/// used in the process a warning is logged.
#[must_use]
pub fn critical_dedupe_key(
    kind: CriticalEventKind,
    run_id: Option<&RunId>,
    trading_date: Option<TradingDate>,
) -> String {
    if let Some(run_id) = run_id.filter(|r| !r.is_empty()) {
        return format!("{kind}:{run_id}");
    }
    if let Some(date) = trading_date {
        return format!("{kind}:{date}");
    }
    if !SENTINEL_WARNED.swap(true, Ordering::Relaxed) {
        tracing::warn!(
            kind = %kind,
            "Critical event reported without run id or trading date; dedupe falls back to a process-wide sentinel"
        );
    }
    format!("{kind}:{DEDUPE_SENTINEL}")
}

/// Result of reporting a critical event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriticalOutcome {
    /// Handed to the notification sink.
    Sent,
    /// Already sent for this dedupe key.
    Duplicate,
    /// Kind is not on the whitelist.
    Rejected,
}

/// Scope of a critical event, used to build its dedupe key.
#[derive(Debug, Clone, Copy, Default)]
pub struct CriticalScope<'a> {
    /// Engine run id.
    pub run_id: Option<&'a RunId>,
    /// Trading date.
    pub trading_date: Option<TradingDate>,
}

/// Rate-limits, dedupes and forwards notifications to the sink.
pub struct AlertDispatcher {
    sink: Arc<dyn NotificationSink>,
    min_interval: chrono::Duration,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
    critical_sent: Mutex<HashSet<String>>,
}

impl AlertDispatcher {
    /// Create a dispatcher with the per-key minimum interval.
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>, min_interval: chrono::Duration) -> Self {
        Self {
            sink,
            min_interval,
            last_sent: Mutex::new(HashMap::new()),
            critical_sent: Mutex::new(HashSet::new()),
        }
    }

    /// Pass the per-key limiter and enqueue. Returns whether it was enqueued.
    pub fn send(&self, notification: Notification, now: DateTime<Utc>) -> bool {
        {
            let mut last_sent = self.last_sent.lock();
            if !notification.priority.is_emergency()
                && let Some(last) = last_sent.get(&notification.key)
                && now - *last < self.min_interval
            {
                tracing::debug!(key = %notification.key, "Notification rate limited");
                metrics::record_notification("rate_limited");
                return false;
            }
            // Entries past the interval no longer limit anything.
            last_sent.retain(|_, at| now - *at < self.min_interval);
            last_sent.insert(notification.key.clone(), now);
        }

        self.sink.enqueue(notification);
        true
    }

    /// Report a critical event by wire name.
    ///
    /// Unknown kinds are logged as rejected and never reach the sink.
    pub fn report_critical(
        &self,
        kind: &str,
        scope: CriticalScope<'_>,
        message: &str,
        now: DateTime<Utc>,
    ) -> CriticalOutcome {
        match kind.parse::<CriticalEventKind>() {
            Ok(kind) => self.report_critical_kind(kind, scope, message, now),
            Err(e) => {
                tracing::warn!(
                    event = "CRITICAL_EVENT_REJECTED",
                    kind = %e.0,
                    "Critical event kind not whitelisted; not notifying"
                );
                CriticalOutcome::Rejected
            }
        }
    }

    /// Report a whitelisted critical event.
    pub fn report_critical_kind(
        &self,
        kind: CriticalEventKind,
        scope: CriticalScope<'_>,
        message: &str,
        now: DateTime<Utc>,
    ) -> CriticalOutcome {
        let key = critical_dedupe_key(kind, scope.run_id, scope.trading_date);

        if !self.critical_sent.lock().insert(key.clone()) {
            tracing::debug!(key = %key, "Critical event already notified for this scope");
            return CriticalOutcome::Duplicate;
        }

        tracing::error!(event = %kind, key = %key, detail = message, "Critical event");
        self.send(
            Notification {
                key,
                kind: kind.as_str().to_string(),
                title: format!("CRITICAL: {kind}"),
                message: message.to_string(),
                priority: NotificationPriority::Emergency,
            },
            now,
        );
        CriticalOutcome::Sent
    }
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("min_interval", &self.min_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Notification>>,
    }

    impl NotificationSink for RecordingSink {
        fn enqueue(&self, notification: Notification) {
            self.sent.lock().push(notification);
        }
    }

    fn dispatcher() -> (AlertDispatcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (
            AlertDispatcher::new(sink.clone(), Duration::minutes(5)),
            sink,
        )
    }

    fn note(key: &str, priority: NotificationPriority) -> Notification {
        Notification {
            key: key.to_string(),
            kind: "TEST".to_string(),
            title: "t".to_string(),
            message: "m".to_string(),
            priority,
        }
    }

    #[test]
    fn per_key_limiter_drops_repeats() {
        let (d, sink) = dispatcher();
        let now = Utc::now();
        assert!(d.send(note("a", NotificationPriority::High), now));
        assert!(!d.send(note("a", NotificationPriority::High), now + Duration::minutes(1)));
        assert!(d.send(note("b", NotificationPriority::High), now + Duration::minutes(1)));
        assert!(d.send(note("a", NotificationPriority::High), now + Duration::minutes(5)));
        assert_eq!(sink.sent.lock().len(), 3);
    }

    #[test]
    fn limiter_forgets_expired_keys() {
        let (d, sink) = dispatcher();
        let start = Utc::now();
        for episode in 0..50 {
            let key = format!("CONNECTION_LOST_SUSTAINED:{episode}");
            let now = start + Duration::minutes(10 * episode);
            assert!(d.send(note(&key, NotificationPriority::Emergency), now));
        }
        assert_eq!(d.last_sent.lock().len(), 1);
        assert_eq!(sink.sent.lock().len(), 50);

        let now = start + Duration::minutes(500);
        assert!(d.send(note("a", NotificationPriority::High), now));
        assert!(!d.send(note("a", NotificationPriority::High), now + Duration::minutes(4)));
        assert_eq!(d.last_sent.lock().len(), 1);
    }

    #[test]
    fn emergency_bypasses_limiter() {
        let (d, sink) = dispatcher();
        let now = Utc::now();
        assert!(d.send(note("a", NotificationPriority::Emergency), now));
        assert!(d.send(note("a", NotificationPriority::Emergency), now));
        assert_eq!(sink.sent.lock().len(), 2);
    }

    #[test]
    fn critical_event_sent_once_per_run() {
        let (d, sink) = dispatcher();
        let run = RunId::new("run-1");
        let scope = CriticalScope {
            run_id: Some(&run),
            trading_date: None,
        };
        let now = Utc::now();
        assert_eq!(
            d.report_critical("RECOVERY_POSITION_UNMATCHED", scope, "x", now),
            CriticalOutcome::Sent
        );
        assert_eq!(
            d.report_critical("RECOVERY_POSITION_UNMATCHED", scope, "x", now),
            CriticalOutcome::Duplicate
        );
        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key, "RECOVERY_POSITION_UNMATCHED:run-1");
        assert_eq!(sent[0].priority, NotificationPriority::Emergency);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let (d, sink) = dispatcher();
        assert_eq!(
            d.report_critical("SOMETHING_ELSE", CriticalScope::default(), "x", Utc::now()),
            CriticalOutcome::Rejected
        );
        assert!(sink.sent.lock().is_empty());
    }

    #[test]
    fn dedupe_key_fallback_chain() {
        let kind = CriticalEventKind::TradingDateInvariantViolation;
        let run = RunId::new("r");
        let date: TradingDate = "2026-03-02".parse().unwrap();
        assert_eq!(
            critical_dedupe_key(kind, Some(&run), Some(date)),
            "TRADING_DATE_INVARIANT_VIOLATION:r"
        );
        assert_eq!(
            critical_dedupe_key(kind, None, Some(date)),
            "TRADING_DATE_INVARIANT_VIOLATION:2026-03-02"
        );
        assert_eq!(
            critical_dedupe_key(kind, Some(&RunId::new("")), None),
            "TRADING_DATE_INVARIANT_VIOLATION:NO_SCOPE"
        );
    }
}
