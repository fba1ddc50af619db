//! Shared fakes and builders for the integration tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use robot_core::application::ports::{
    ExecutionAdapter, ExecutionError, JournalError, JournalReader, JournalRecord, Notification,
    NotificationSink, StreamFactory, StreamWorkflow, TimetableError, TimetableSource,
};
use robot_core::application::{
    AlertDispatcher, ConnectionLossCoordinator, EngineDeps, HealthMonitor, RobotEngine,
    StreamActivity,
};
use robot_core::config::RobotConfig;
use robot_core::domain::account::{AccountSnapshot, Position, WorkingOrder};
use robot_core::domain::bar::Bar;
use robot_core::domain::shared::{BrokerOrderId, InstrumentId, RunId, StreamId, TradingDate};
use robot_core::domain::stream::{RecoveryManageReason, StreamParams, StreamState};
use robot_core::domain::timetable::{StreamDirectiveDocument, TimetableDocument, TimetableMetadata};
use robot_core::domain::trading_spec::TradingSpec;
use robot_core::infrastructure::{MemoryEventSink, ZoneCalendar};

// ============================================
// Time
// ============================================

/// 2026-03-02 09:00 in Chicago (CST, UTC-6).
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
}

pub fn secs(n: i64) -> Duration {
    Duration::seconds(n)
}

pub const TODAY: &str = "2026-03-02";

pub fn date(value: &str) -> TradingDate {
    value.parse().unwrap()
}

// ============================================
// Documents
// ============================================

pub fn load_spec() -> TradingSpec {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/fixtures/trading_spec.json");
    TradingSpec::load(path.to_str().unwrap())
        .unwrap_or_else(|e| panic!("Failed to load spec fixture {}: {e}", path.display()))
}

pub fn directive(stream: &str, instrument: &str, session: &str, slot_time: &str) -> StreamDirectiveDocument {
    StreamDirectiveDocument {
        stream: stream.to_string(),
        instrument: instrument.to_string(),
        session: session.to_string(),
        slot_time: slot_time.to_string(),
        enabled: true,
    }
}

pub fn timetable(trading_date: &str, streams: Vec<StreamDirectiveDocument>) -> TimetableDocument {
    TimetableDocument {
        trading_date: trading_date.to_string(),
        timezone: "America/Chicago".to_string(),
        metadata: None,
        streams,
    }
}

pub fn replay_timetable(trading_date: &str, streams: Vec<StreamDirectiveDocument>) -> TimetableDocument {
    TimetableDocument {
        metadata: Some(TimetableMetadata { replay: true }),
        ..timetable(trading_date, streams)
    }
}

pub fn bar(instrument: &str, timestamp: DateTime<Utc>) -> Bar {
    Bar {
        timestamp,
        instrument: InstrumentId::new(instrument),
        open: Decimal::new(500_000, 2),
        high: Decimal::new(500_250, 2),
        low: Decimal::new(499_750, 2),
        close: Decimal::new(500_100, 2),
        is_historical: false,
    }
}

// ============================================
// Timetable and journal
// ============================================

#[derive(Default)]
pub struct FakeTimetable {
    document: Mutex<Option<TimetableDocument>>,
    pub loads: AtomicUsize,
}

impl FakeTimetable {
    pub fn set(&self, document: TimetableDocument) {
        *self.document.lock() = Some(document);
    }

    /// Subsequent loads fail as unreadable.
    pub fn fail(&self) {
        *self.document.lock() = None;
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimetableSource for FakeTimetable {
    async fn load(&self) -> Result<TimetableDocument, TimetableError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.document
            .lock()
            .clone()
            .ok_or_else(|| TimetableError::Unavailable {
                message: "no timetable".to_string(),
            })
    }
}

#[derive(Default)]
pub struct FakeJournal {
    records: Mutex<HashMap<StreamId, JournalRecord>>,
    broken: Mutex<HashSet<StreamId>>,
}

impl FakeJournal {
    pub fn commit(&self, stream: &str) {
        self.records.lock().insert(
            StreamId::new(stream),
            JournalRecord {
                committed: true,
                commit_reason: Some("STOP_FILLED".to_string()),
                ..Default::default()
            },
        );
    }

    pub fn break_stream(&self, stream: &str) {
        self.broken.lock().insert(StreamId::new(stream));
    }

    pub fn repair(&self) {
        self.broken.lock().clear();
    }
}

#[async_trait]
impl JournalReader for FakeJournal {
    async fn load(
        &self,
        trading_date: TradingDate,
        stream: &StreamId,
    ) -> Result<Option<JournalRecord>, JournalError> {
        if self.broken.lock().contains(stream) {
            return Err(JournalError::Read {
                path: format!("{trading_date}_{stream}.json"),
                source: std::io::Error::other("disk error"),
            });
        }
        Ok(self.records.lock().get(stream).cloned())
    }
}

// ============================================
// Streams
// ============================================

/// Observable state of one fake stream, shared with the test.
#[derive(Debug)]
pub struct StreamProbe {
    pub params: Mutex<StreamParams>,
    pub state: Mutex<StreamState>,
    pub committed: AtomicBool,
    pub confirms_recovery: AtomicBool,
    pub ticks: AtomicUsize,
    pub bars: AtomicUsize,
    pub date_updates: AtomicUsize,
    pub recovery_calls: Mutex<Vec<RecoveryManageReason>>,
}

impl StreamProbe {
    pub fn armed(&self) -> bool {
        *self.state.lock() != StreamState::PreHydration
    }

    pub fn tick_count(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn bar_count(&self) -> usize {
        self.bars.load(Ordering::SeqCst)
    }

    pub fn set_state(&self, state: StreamState) {
        *self.state.lock() = state;
    }
}

pub struct FakeStream {
    stream: StreamId,
    instrument: InstrumentId,
    probe: Arc<StreamProbe>,
}

impl StreamWorkflow for FakeStream {
    fn stream_id(&self) -> &StreamId {
        &self.stream
    }

    fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    fn state(&self) -> StreamState {
        *self.probe.state.lock()
    }

    fn committed(&self) -> bool {
        self.probe.committed.load(Ordering::SeqCst)
    }

    fn range_invalidated(&self) -> bool {
        false
    }

    fn arm(&mut self, _now: DateTime<Utc>) {
        *self.probe.state.lock() = StreamState::Armed;
    }

    fn tick(&mut self, _now: DateTime<Utc>) {
        self.probe.ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_bar(&mut self, _bar: &Bar, _now: DateTime<Utc>) {
        self.probe.bars.fetch_add(1, Ordering::SeqCst);
    }

    fn apply_directive_update(&mut self, slot_time: &str, trading_date: TradingDate, _now: DateTime<Utc>) {
        let mut params = self.probe.params.lock();
        params.slot_time = slot_time.to_string();
        params.trading_date = trading_date;
    }

    fn update_trading_date(&mut self, trading_date: TradingDate, _now: DateTime<Utc>) {
        self.probe.params.lock().trading_date = trading_date;
        self.probe.date_updates.fetch_add(1, Ordering::SeqCst);
    }

    fn enter_recovery_manage(&mut self, _now: DateTime<Utc>, reason: RecoveryManageReason) -> bool {
        self.probe.recovery_calls.lock().push(reason);
        self.probe.confirms_recovery.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeFactory {
    created: Mutex<Vec<Arc<StreamProbe>>>,
}

impl FakeFactory {
    pub fn created(&self) -> usize {
        self.created.lock().len()
    }

    /// Most recently created stream with this id.
    pub fn probe(&self, stream: &str) -> Arc<StreamProbe> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|p| p.params.lock().stream.as_str() == stream)
            .cloned()
            .unwrap_or_else(|| panic!("stream {stream} was never created"))
    }
}

impl StreamFactory for FakeFactory {
    fn create(&self, params: StreamParams) -> Box<dyn StreamWorkflow> {
        let probe = Arc::new(StreamProbe {
            params: Mutex::new(params.clone()),
            state: Mutex::new(StreamState::PreHydration),
            committed: AtomicBool::new(false),
            confirms_recovery: AtomicBool::new(true),
            ticks: AtomicUsize::new(0),
            bars: AtomicUsize::new(0),
            date_updates: AtomicUsize::new(0),
            recovery_calls: Mutex::new(Vec::new()),
        });
        self.created.lock().push(Arc::clone(&probe));
        Box::new(FakeStream {
            stream: params.stream,
            instrument: params.instrument,
            probe,
        })
    }
}

// ============================================
// Broker
// ============================================

#[derive(Default)]
pub struct FakeExecution {
    snapshot: Mutex<AccountSnapshot>,
    pub fail_snapshot: AtomicBool,
    pub fail_cancel: AtomicBool,
    pub snapshots: AtomicUsize,
    pub cancelled: Mutex<Vec<WorkingOrder>>,
}

impl FakeExecution {
    pub fn set_position(&self, instrument: &str, quantity: i64) {
        let mut snapshot = self.snapshot.lock();
        snapshot.positions.retain(|p| p.instrument.as_str() != instrument);
        snapshot.positions.push(Position {
            instrument: InstrumentId::new(instrument),
            quantity: Decimal::from(quantity),
            average_price: Decimal::new(500_000, 2),
        });
    }

    pub fn add_order(&self, id: &str, instrument: &str, tag: &str) {
        self.snapshot.lock().working_orders.push(WorkingOrder {
            id: BrokerOrderId::new(id),
            instrument: InstrumentId::new(instrument),
            tag: Some(tag.to_string()),
            oco_group: None,
        });
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    pub fn cancelled_ids(&self) -> Vec<String> {
        self.cancelled
            .lock()
            .iter()
            .map(|o| o.id.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl ExecutionAdapter for FakeExecution {
    async fn get_account_snapshot(&self, _now: DateTime<Utc>) -> Result<AccountSnapshot, ExecutionError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(ExecutionError::Unavailable {
                message: "broker offline".to_string(),
            });
        }
        Ok(self.snapshot.lock().clone())
    }

    async fn cancel_robot_owned_working_orders(
        &self,
        orders: &[WorkingOrder],
        _now: DateTime<Utc>,
    ) -> Result<usize, ExecutionError> {
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(ExecutionError::Rejected {
                message: "cancel rejected".to_string(),
            });
        }
        let ids: HashSet<&BrokerOrderId> = orders.iter().map(|o| &o.id).collect();
        self.snapshot
            .lock()
            .working_orders
            .retain(|o| !ids.contains(&o.id));
        self.cancelled.lock().extend(orders.iter().cloned());
        Ok(orders.len())
    }
}

// ============================================
// Notifications
// ============================================

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn all(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    pub fn of_kind(&self, kind: &str) -> Vec<Notification> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn enqueue(&self, notification: Notification) {
        self.sent.lock().push(notification);
    }
}

// ============================================
// Engine harness
// ============================================

pub struct Harness {
    pub engine: RobotEngine,
    pub monitor: Arc<HealthMonitor>,
    pub events: MemoryEventSink,
    pub notifications: Arc<RecordingSink>,
    pub timetable: Arc<FakeTimetable>,
    pub journal: Arc<FakeJournal>,
    pub streams: Arc<FakeFactory>,
    pub execution: Arc<FakeExecution>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&RobotConfig::default())
    }

    pub fn with_config(config: &RobotConfig) -> Self {
        let events = MemoryEventSink::new();
        let notifications = Arc::new(RecordingSink::default());
        let timetable = Arc::new(FakeTimetable::default());
        let journal = Arc::new(FakeJournal::default());
        let streams = Arc::new(FakeFactory::default());
        let execution = Arc::new(FakeExecution::default());

        let alerts = Arc::new(AlertDispatcher::new(
            notifications.clone(),
            config.health.notification_min_interval(),
        ));
        let activity = Arc::new(StreamActivity::new());
        let monitor = Arc::new(HealthMonitor::new(
            config.health.clone(),
            alerts,
            Arc::new(ConnectionLossCoordinator::new()),
            activity.clone(),
        ));

        let deps = EngineDeps {
            spec: Arc::new(load_spec()),
            calendar: Arc::new(ZoneCalendar::supported()),
            timetable: timetable.clone(),
            journal: journal.clone(),
            streams: streams.clone(),
            execution: execution.clone(),
            events: Arc::new(events.clone()),
            health: Arc::clone(&monitor),
            activity,
        };
        let engine = RobotEngine::new(config, RunId::new("run-test"), deps).unwrap();

        Self {
            engine,
            monitor,
            events,
            notifications,
            timetable,
            journal,
            streams,
            execution,
        }
    }

    /// Harness started at `t0()` with one armed `ES1` stream.
    pub async fn started_with_es1() -> Self {
        let harness = Self::new();
        harness
            .timetable
            .set(timetable(TODAY, vec![directive("ES1", "ES", "S1", "07:30")]));
        harness.engine.start(t0()).await.unwrap();
        harness
    }

    pub async fn stream_ids(&self) -> Vec<String> {
        self.engine
            .stream_ids()
            .await
            .iter()
            .map(|s| s.as_str().to_string())
            .collect()
    }

    /// Reasons of every `TIMETABLE_DIRECTIVE_SKIPPED` event.
    pub fn skip_reasons(&self) -> Vec<String> {
        self.events
            .of_type("TIMETABLE_DIRECTIVE_SKIPPED")
            .iter()
            .map(|e| e.data["reason"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Reasons of every `STAND_DOWN` event.
    pub fn stand_down_reasons(&self) -> Vec<String> {
        self.events
            .of_type("STAND_DOWN")
            .iter()
            .map(|e| e.data["reason"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}
