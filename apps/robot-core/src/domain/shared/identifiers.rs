//! Strongly-typed identifiers for the robot core.
//!
//! Several maps in the engine and the health monitor are keyed by strings
//! (rejection stats, bar heartbeats, dedupe timestamps). Wrapping the keys
//! keeps an instrument from ever being looked up in a per-stream map.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(StreamId, "Identifier of one stream (e.g. `ES1`).");
define_id!(InstrumentId, "Instrument symbol as used by the specification (e.g. `ES`).");
define_id!(SessionName, "Name of a trading session in the specification (e.g. `S1`).");
define_id!(BrokerOrderId, "Broker-side identifier of a working order.");
define_id!(RunId, "Identifier of one engine run, used as the notification dedupe scope.");

impl RunId {
    /// Generate a fresh run identifier (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl StreamId {
    /// Pseudo stream name used for engine-level events.
    pub const ENGINE: &'static str = "__engine__";
}
