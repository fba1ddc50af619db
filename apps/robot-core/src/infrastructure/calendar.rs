//! Civil calendar of the supported timezone, backed by `chrono-tz`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::application::ports::TradingCalendar;
use crate::domain::shared::SUPPORTED_TIMEZONE;

/// Calendar in one IANA timezone.
#[derive(Debug, Clone, Copy)]
pub struct ZoneCalendar {
    zone: Tz,
}

impl ZoneCalendar {
    /// Calendar of the timezone the timetable must declare.
    #[must_use]
    pub const fn supported() -> Self {
        Self {
            zone: chrono_tz::America::Chicago,
        }
    }

    /// Calendar of an arbitrary IANA zone name.
    #[must_use]
    pub fn named(name: &str) -> Option<Self> {
        name.parse::<Tz>().ok().map(|zone| Self { zone })
    }

    /// Zone name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.zone.name()
    }
}

impl Default for ZoneCalendar {
    fn default() -> Self {
        Self::supported()
    }
}

impl TradingCalendar for ZoneCalendar {
    fn civil_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.zone).date_naive()
    }

    fn local_datetime(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.zone).naive_local()
    }

    fn local_rfc3339(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.zone).to_rfc3339()
    }

    /// Ambiguous local times (DST fall-back) resolve to the earlier instant;
    /// nonexistent ones (spring-forward gap) yield `None`.
    fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.zone
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
