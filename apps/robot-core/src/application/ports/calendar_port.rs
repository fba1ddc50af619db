//! Trading Calendar Port (Driven Port)
//!
//! Conversion between UTC instants and the fixed civil timezone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Civil calendar capability.
pub trait TradingCalendar: Send + Sync {
    /// Civil date of an instant.
    fn civil_date(&self, instant: DateTime<Utc>) -> NaiveDate;

    /// Civil date and time of an instant.
    fn local_datetime(&self, instant: DateTime<Utc>) -> NaiveDateTime;

    /// RFC 3339 rendering of an instant with the civil offset.
    fn local_rfc3339(&self, instant: DateTime<Utc>) -> String;

    /// UTC instant of a civil date and time. `None` when the civil time does
    /// not exist (spring-forward gap).
    fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>>;
}
