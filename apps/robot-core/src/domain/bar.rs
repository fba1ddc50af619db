//! Market data bars and the trading-session window they are admitted against.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::shared::InstrumentId;

/// One OHLC bar. `timestamp` is the bar's open instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open instant.
    pub timestamp: DateTime<Utc>,
    /// Instrument symbol.
    pub instrument: InstrumentId,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Whether the bar comes from a historical backfill.
    #[serde(default)]
    pub is_historical: bool,
}

/// Half-open interval `[start, end)` of one instrument's trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    /// First admitted instant.
    pub start: DateTime<Utc>,
    /// First instant past the session.
    pub end: DateTime<Utc>,
}

impl SessionWindow {
    /// Create a window.
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `start <= t < end`.
    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Why the bar pipeline refused a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BarRejectionReason {
    /// Bar is ahead of engine time by more than the tolerance.
    FutureBar,
    /// No trading date is locked.
    NoTradingDate,
    /// Bar lies outside the instrument's session window.
    OutsideSession,
}

impl BarRejectionReason {
    /// All reasons, in pipeline order.
    pub const ALL: [Self; 3] = [Self::FutureBar, Self::NoTradingDate, Self::OutsideSession];

    /// Stable reason code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FutureBar => "FUTURE_BAR",
            Self::NoTradingDate => "NO_TRADING_DATE",
            Self::OutsideSession => "OUTSIDE_SESSION",
        }
    }
}

impl std::fmt::Display for BarRejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
