//! Timetable ingestion through the engine: trading-date locking, directive
//! admission, journal gating and stand-down.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{Harness, TODAY, date, directive, replay_timetable, secs, t0, timetable};
use robot_core::EngineError;
use robot_core::config::RobotConfig;
use robot_core::domain::mode::ExecutionMode;
use robot_core::domain::timetable::StreamDirectiveDocument;
use test_case::test_case;

// ============================================
// Acceptance
// ============================================

#[tokio::test]
async fn test_valid_directive_arms_stream_and_emits_acceptance() {
    let h = Harness::started_with_es1().await;

    assert_eq!(h.engine.trading_date().await, Some(date(TODAY)));
    assert_eq!(h.stream_ids().await, vec!["ES1"]);
    assert!(h.streams.probe("ES1").armed());

    assert_eq!(h.events.count("TRADING_DATE_LOCKED"), 1);
    assert_eq!(h.events.count("TIMETABLE_DIRECTIVE_ACCEPTED"), 1);
    assert_eq!(h.events.count("STREAM_ARMED"), 1);
    assert!(h.skip_reasons().is_empty());

    let armed = &h.events.of_type("STREAM_ARMED")[0];
    assert_eq!(armed.stream, "ES1");
    assert_eq!(armed.slot_time.as_deref(), Some("07:30"));
    assert_eq!(armed.state.as_deref(), Some("ARMED"));
}

#[tokio::test]
async fn test_repeated_polls_do_not_recreate_streams() {
    let h = Harness::started_with_es1().await;

    h.engine.force_timetable_reload(t0() + secs(1)).await;
    h.engine.force_timetable_reload(t0() + secs(2)).await;

    assert_eq!(h.streams.created(), 1);
    assert_eq!(h.events.count("STREAM_ARMED"), 1);
}

#[tokio::test]
async fn test_timetable_polled_on_interval_only() {
    let h = Harness::started_with_es1().await;
    let after_start = h.timetable.load_count();

    h.engine.tick(t0() + secs(1)).await;
    assert_eq!(h.timetable.load_count(), after_start);

    h.engine.tick(t0() + secs(5)).await;
    assert_eq!(h.timetable.load_count(), after_start + 1);
}

#[tokio::test]
async fn test_ticks_reach_armed_streams() {
    let h = Harness::started_with_es1().await;

    h.engine.tick(t0() + secs(1)).await;
    h.engine.tick(t0() + secs(2)).await;

    assert_eq!(h.streams.probe("ES1").tick_count(), 2);
}

// ============================================
// Directive skips
// ============================================

#[test_case(StreamDirectiveDocument { enabled: false, ..directive("ES1", "ES", "S1", "07:30") }, "STREAM_DISABLED" ; "disabled")]
#[test_case(directive("ES1", "", "S1", "07:30"), "MISSING_FIELDS" ; "missing instrument")]
#[test_case(directive("ES1", "ES", "S9", "07:30"), "UNKNOWN_SESSION" ; "unknown session")]
#[test_case(directive("ES1", "ES", "S1", "07:45"), "INVALID_SLOT_TIME" ; "slot not in session")]
#[test_case(directive("ZZ1", "ZZ", "S1", "07:30"), "UNKNOWN_INSTRUMENT" ; "unknown instrument")]
#[tokio::test]
async fn test_rejected_directive_is_skipped(doc: StreamDirectiveDocument, reason: &str) {
    let h = Harness::new();
    h.timetable.set(timetable(TODAY, vec![doc]));
    h.engine.start(t0()).await.unwrap();

    assert!(h.stream_ids().await.is_empty());
    assert_eq!(h.streams.created(), 0);
    assert_eq!(h.skip_reasons(), vec![reason.to_string()]);
}

#[tokio::test]
async fn test_unknown_instrument_skip_reported_once_and_bars_never_delivered() {
    let h = Harness::new();
    h.timetable
        .set(timetable(TODAY, vec![directive("ZZ1", "ZZ", "S1", "07:30")]));
    h.engine.start(t0()).await.unwrap();
    h.engine.force_timetable_reload(t0() + secs(5)).await;

    let skipped = h.events.of_type("TIMETABLE_DIRECTIVE_SKIPPED");
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].stream, "ZZ1");
    assert_eq!(skipped[0].data["reason"], "UNKNOWN_INSTRUMENT");

    let disposition = h
        .engine
        .on_bar(&common::bar("ZZ", t0() - secs(60)), t0())
        .await;
    assert!(matches!(
        disposition,
        robot_core::BarDisposition::Rejected(_) | robot_core::BarDisposition::Accepted { delivered: 0 }
    ));
    assert_eq!(h.streams.created(), 0);
}

#[tokio::test]
async fn test_duplicate_stream_id_last_occurrence_wins() {
    let h = Harness::new();
    h.timetable.set(timetable(
        TODAY,
        vec![
            directive("ES1", "ES", "S1", "07:30"),
            directive("ES1", "ES", "S1", "08:00"),
        ],
    ));
    h.engine.start(t0()).await.unwrap();

    assert_eq!(h.events.count("DUPLICATE_STREAM_ID"), 1);
    assert_eq!(h.streams.created(), 1);
    assert_eq!(h.streams.probe("ES1").params.lock().slot_time, "08:00");
}

// ============================================
// Journal
// ============================================

#[tokio::test]
async fn test_committed_stream_registered_but_never_armed() {
    let h = Harness::new();
    h.journal.commit("ES1");
    h.timetable
        .set(timetable(TODAY, vec![directive("ES1", "ES", "S1", "07:30")]));
    h.engine.start(t0()).await.unwrap();

    assert_eq!(h.stream_ids().await, vec!["ES1"]);
    let probe = h.streams.probe("ES1");
    assert!(!probe.armed());
    assert_eq!(h.skip_reasons(), vec!["ALREADY_COMMITTED".to_string()]);
    assert_eq!(h.events.count("STREAM_ARMED"), 0);

    h.engine.tick(t0() + secs(1)).await;
    assert_eq!(probe.tick_count(), 0);
}

#[tokio::test]
async fn test_committed_stream_ignores_directive_updates() {
    let h = Harness::new();
    h.journal.commit("ES1");
    h.timetable
        .set(timetable(TODAY, vec![directive("ES1", "ES", "S1", "07:30")]));
    h.engine.start(t0()).await.unwrap();

    h.timetable
        .set(timetable(TODAY, vec![directive("ES1", "ES", "S1", "08:00")]));
    h.engine.force_timetable_reload(t0() + secs(5)).await;

    assert_eq!(h.streams.probe("ES1").params.lock().slot_time, "07:30");
    let ignored = h.events.of_type("TIMETABLE_UPDATE_IGNORED");
    assert_eq!(ignored.len(), 1);
    assert_eq!(ignored[0].data["reason"], "COMMITTED");
}

#[tokio::test]
async fn test_journal_error_skips_until_readable() {
    let h = Harness::new();
    h.journal.break_stream("ES1");
    h.timetable
        .set(timetable(TODAY, vec![directive("ES1", "ES", "S1", "07:30")]));
    h.engine.start(t0()).await.unwrap();

    assert!(h.stream_ids().await.is_empty());
    assert_eq!(h.skip_reasons(), vec!["JOURNAL_UNAVAILABLE".to_string()]);

    h.journal.repair();
    h.engine.force_timetable_reload(t0() + secs(5)).await;

    assert_eq!(h.stream_ids().await, vec!["ES1"]);
    assert!(h.streams.probe("ES1").armed());
}

// ============================================
// Updates
// ============================================

#[tokio::test]
async fn test_slot_change_applied_to_uncommitted_stream() {
    let h = Harness::started_with_es1().await;

    h.timetable
        .set(timetable(TODAY, vec![directive("ES1", "ES", "S1", "08:00")]));
    h.engine.force_timetable_reload(t0() + secs(5)).await;

    assert_eq!(h.streams.created(), 1);
    assert_eq!(h.streams.probe("ES1").params.lock().slot_time, "08:00");
    assert_eq!(h.events.count("STREAM_UPDATED"), 1);
}

// ============================================
// Trading date lock and stand-down
// ============================================

#[tokio::test]
async fn test_timezone_mismatch_stands_down_and_clears_registry() {
    let h = Harness::started_with_es1().await;

    let mut doc = timetable(TODAY, vec![directive("ES1", "ES", "S1", "07:30")]);
    doc.timezone = "America/New_York".to_string();
    h.timetable.set(doc);
    h.engine.force_timetable_reload(t0() + secs(5)).await;

    assert!(h.stream_ids().await.is_empty());
    assert_eq!(h.engine.trading_date().await, None);
    assert_eq!(h.stand_down_reasons(), vec!["TIMEZONE_MISMATCH".to_string()]);
}

#[test_case("2026-03-01", "STALE_TRADING_DATE" ; "yesterday")]
#[test_case("2026-03-03", "FUTURE_TRADING_DATE" ; "tomorrow")]
#[test_case("03/02/2026", "INVALID_TRADING_DATE" ; "unparseable")]
#[tokio::test]
async fn test_invalid_trading_date_stands_down(trading_date: &str, reason: &str) {
    let h = Harness::new();
    h.timetable
        .set(timetable(trading_date, vec![directive("ES1", "ES", "S1", "07:30")]));
    h.engine.start(t0()).await.unwrap();

    assert!(h.stream_ids().await.is_empty());
    assert_eq!(h.engine.trading_date().await, None);
    assert_eq!(h.stand_down_reasons(), vec![reason.to_string()]);
}

#[tokio::test]
async fn test_unreadable_timetable_stands_down_once() {
    let h = Harness::started_with_es1().await;

    h.timetable.fail();
    h.engine.force_timetable_reload(t0() + secs(5)).await;
    h.engine.force_timetable_reload(t0() + secs(10)).await;

    assert!(h.stream_ids().await.is_empty());
    assert_eq!(h.stand_down_reasons(), vec!["TIMETABLE_UNAVAILABLE".to_string()]);
}

#[tokio::test]
async fn test_recovers_after_stand_down() {
    let h = Harness::started_with_es1().await;
    h.timetable.fail();
    h.engine.force_timetable_reload(t0() + secs(5)).await;

    h.timetable
        .set(timetable(TODAY, vec![directive("ES1", "ES", "S1", "07:30")]));
    h.engine.force_timetable_reload(t0() + secs(10)).await;

    assert_eq!(h.engine.trading_date().await, Some(date(TODAY)));
    assert_eq!(h.stream_ids().await, vec!["ES1"]);
    assert_eq!(h.streams.created(), 2);
}

#[tokio::test]
async fn test_locked_date_kept_when_timetable_date_changes() {
    let h = Harness::new();
    h.timetable.set(replay_timetable(
        "2026-02-27",
        vec![directive("ES1", "ES", "S1", "07:30")],
    ));
    h.engine.start(t0()).await.unwrap();
    assert_eq!(h.engine.trading_date().await, Some(date("2026-02-27")));

    h.timetable.set(replay_timetable(
        "2026-02-26",
        vec![
            directive("ES1", "ES", "S1", "08:00"),
            directive("NQ1", "NQ", "S1", "07:30"),
        ],
    ));
    h.engine.force_timetable_reload(t0() + secs(5)).await;
    h.engine.force_timetable_reload(t0() + secs(10)).await;

    assert_eq!(h.engine.trading_date().await, Some(date("2026-02-27")));
    assert_eq!(h.stream_ids().await, vec!["ES1"]);
    assert_eq!(h.streams.probe("ES1").params.lock().slot_time, "07:30");
    assert_eq!(h.events.count("TRADING_DATE_MISMATCH"), 1);
}

// ============================================
// Lifecycle
// ============================================

#[tokio::test]
async fn test_unauthorized_mode_refuses_start_with_emergency_alert() {
    let mut config = RobotConfig::default();
    config.environment.mode = ExecutionMode::Live;
    let h = Harness::with_config(&config);
    h.timetable
        .set(timetable(TODAY, vec![directive("ES1", "ES", "S1", "07:30")]));

    let result = h.engine.start(t0()).await;
    assert!(matches!(
        result,
        Err(EngineError::ExecutionModeNotAuthorized {
            mode: ExecutionMode::Live
        })
    ));

    let alerts = h.notifications.of_kind("EXECUTION_MODE_NOT_AUTHORIZED");
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].priority.is_emergency());
    assert_eq!(h.events.count("ENGINE_START_REFUSED"), 1);
    assert_eq!(h.timetable.load_count(), 0);
    assert!(h.stream_ids().await.is_empty());
}

#[tokio::test]
async fn test_stop_makes_entrypoints_no_ops() {
    let h = Harness::started_with_es1().await;
    let probe = h.streams.probe("ES1");

    h.engine.stop(t0() + secs(1)).await;
    let loads = h.timetable.load_count();
    h.engine.tick(t0() + secs(10)).await;
    let disposition = h
        .engine
        .on_bar(&common::bar("ES", t0() - secs(60)), t0() + secs(10))
        .await;

    assert_eq!(disposition, robot_core::BarDisposition::Ignored);
    assert_eq!(h.timetable.load_count(), loads);
    assert_eq!(probe.tick_count(), 0);
    assert_eq!(h.engine.trading_date().await, None);
    assert_eq!(h.events.count("ENGINE_STOP"), 1);
}
