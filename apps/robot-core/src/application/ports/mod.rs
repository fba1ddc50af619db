//! Application Ports (Driven)
//!
//! Interfaces for every external collaborator of the core:
//! streams, broker, timetable, journal, calendar, notifications, event log,
//! and the active-streams probe consulted by the health monitor.

mod calendar_port;
mod event_port;
mod execution_port;
mod journal_port;
mod notification_port;
mod stream_port;
mod timetable_port;

pub use calendar_port::TradingCalendar;
pub use event_port::{EventSink, NoOpEventSink, RobotEvent};
pub use execution_port::{DryRunExecutionAdapter, ExecutionAdapter, ExecutionError};
pub use journal_port::{JournalError, JournalReader, JournalRecord};
pub use notification_port::{
    NoOpNotificationSink, Notification, NotificationPriority, NotificationSink,
};
pub use stream_port::{StreamFactory, StreamWorkflow};
pub use timetable_port::{TimetableError, TimetableSource};

/// Whether at least one stream is in an active trading state. Stall checks
/// are suppressed while this is false.
pub trait ActiveStreamsProbe: Send + Sync {
    /// Current answer.
    fn has_active_streams(&self) -> bool;
}
