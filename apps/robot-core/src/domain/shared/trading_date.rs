//! Civil trading date.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// The only civil timezone the core accepts in timetables and uses for
/// session windows.
pub const SUPPORTED_TIMEZONE: &str = "America/Chicago";

/// A civil date (in [`SUPPORTED_TIMEZONE`]) that scopes one engine run's streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingDate(NaiveDate);

impl TradingDate {
    /// Wrap a civil date.
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The wrapped civil date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.0
    }

    /// The civil day before this one.
    #[must_use]
    pub fn previous_day(&self) -> NaiveDate {
        self.0.checked_sub_days(Days::new(1)).unwrap_or(self.0)
    }
}

impl From<NaiveDate> for TradingDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl FromStr for TradingDate {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map(Self)
    }
}

impl TryFrom<String> for TradingDate {
    type Error = chrono::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TradingDate> for String {
    fn from(value: TradingDate) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TradingDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}
