//! Infrastructure Layer
//!
//! Adapters behind the application ports, plus process-wide telemetry:
//!
//! - [`calendar`]: `chrono-tz` civil calendar
//! - [`timetable_file`] / [`journal_file`]: JSON documents on disk
//! - [`event_log`]: JSON-lines structured event log
//! - [`notification`]: notification service, webhook and log transports
//! - [`stream`]: passive stream workflow
//! - [`metrics`] / [`telemetry`]: Prometheus exporter and tracing subscriber

pub mod calendar;
pub mod event_log;
pub mod journal_file;
pub mod metrics;
pub mod notification;
pub mod stream;
pub mod telemetry;
pub mod timetable_file;

pub use calendar::ZoneCalendar;
pub use event_log::{JsonlEventLog, MemoryEventSink};
pub use journal_file::FileJournalReader;
pub use notification::{
    KindThrottle, LogTransport, NotificationError, NotificationService, NotificationTransport,
    WebhookTransport,
};
pub use stream::PassiveStreamFactory;
pub use timetable_file::FileTimetableSource;
