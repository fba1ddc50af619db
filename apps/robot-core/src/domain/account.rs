//! Broker account snapshot used by recovery reconciliation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::shared::{BrokerOrderId, InstrumentId};

/// An open (or flat) position at the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Instrument symbol.
    pub instrument: InstrumentId,
    /// Signed quantity; negative is short.
    pub quantity: Decimal,
    /// Average entry price.
    pub average_price: Decimal,
}

impl Position {
    /// Whether the position carries no exposure.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// A working order at the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingOrder {
    /// Broker order id.
    pub id: BrokerOrderId,
    /// Instrument symbol.
    pub instrument: InstrumentId,
    /// Ownership tag set when the order was submitted.
    #[serde(default)]
    pub tag: Option<String>,
    /// OCO grouping tag.
    #[serde(default)]
    pub oco_group: Option<String>,
}

impl WorkingOrder {
    /// Whether the tag or the OCO group starts with `prefix`.
    ///
    /// An empty prefix owns nothing.
    #[must_use]
    pub fn is_robot_owned(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return false;
        }
        let starts = |v: &Option<String>| v.as_deref().is_some_and(|s| s.starts_with(prefix));
        starts(&self.tag) || starts(&self.oco_group)
    }
}

/// Positions and working orders at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// All reported positions, flat ones included.
    #[serde(default)]
    pub positions: Vec<Position>,
    /// All working orders.
    #[serde(default)]
    pub working_orders: Vec<WorkingOrder>,
}

impl AccountSnapshot {
    /// Positions with non-zero quantity.
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| !p.is_flat())
    }

    /// Working orders owned by this robot.
    #[must_use]
    pub fn robot_owned_orders(&self, prefix: &str) -> Vec<WorkingOrder> {
        self.working_orders
            .iter()
            .filter(|o| o.is_robot_owned(prefix))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(tag: Option<&str>, oco: Option<&str>) -> WorkingOrder {
        WorkingOrder {
            id: BrokerOrderId::new("1"),
            instrument: InstrumentId::new("ES"),
            tag: tag.map(String::from),
            oco_group: oco.map(String::from),
        }
    }

    #[test]
    fn ownership_is_strict_prefix() {
        assert!(order(Some("ROBOT:ES1:entry"), None).is_robot_owned("ROBOT:"));
        assert!(order(None, Some("ROBOT:OCO:1")).is_robot_owned("ROBOT:"));
        assert!(!order(Some("manual ROBOT:"), None).is_robot_owned("ROBOT:"));
        assert!(!order(None, None).is_robot_owned("ROBOT:"));
    }

    #[test]
    fn empty_prefix_owns_nothing() {
        assert!(!order(Some("anything"), Some("x")).is_robot_owned(""));
    }

    #[test]
    fn open_positions_skip_flat() {
        let snapshot = AccountSnapshot {
            positions: vec![
                Position {
                    instrument: InstrumentId::new("ES"),
                    quantity: dec!(0),
                    average_price: dec!(0),
                },
                Position {
                    instrument: InstrumentId::new("NQ"),
                    quantity: dec!(-2),
                    average_price: dec!(18250.25),
                },
            ],
            working_orders: vec![order(Some("ROBOT:a"), None), order(Some("other"), None)],
        };
        let open: Vec<_> = snapshot.open_positions().collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].instrument.as_str(), "NQ");
        assert_eq!(snapshot.robot_owned_orders("ROBOT:").len(), 1);
    }
}
