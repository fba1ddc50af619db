//! Shared value objects used across the domain.

mod identifiers;
mod trading_date;

pub use identifiers::{BrokerOrderId, InstrumentId, RunId, SessionName, StreamId};
pub use trading_date::{SUPPORTED_TIMEZONE, TradingDate};

/// Parse a civil `HH:MM` time string.
///
/// Returns `None` for anything else, including `HH:MM:SS`.
#[must_use]
pub fn parse_civil_time(value: &str) -> Option<chrono::NaiveTime> {
    let value = value.trim();
    if value.len() != 5 {
        return None;
    }
    chrono::NaiveTime::parse_from_str(value, "%H:%M").ok()
}
