//! Discrepancy types for position reconciliation.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of disagreement between tracked and broker positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyKind {
    /// Tracked locally, absent at the broker.
    MissingInBroker,
    /// Held at the broker, unknown locally.
    MissingInSystem,
    /// Both sides hold the symbol with different quantities.
    QuantityMismatch,
    /// Quantities agree, average prices differ beyond tolerance.
    PriceMismatch,
}

impl DiscrepancyKind {
    /// Severity of this kind of drift.
    #[must_use]
    pub const fn severity(&self) -> DiscrepancySeverity {
        match self {
            Self::PriceMismatch => DiscrepancySeverity::Warning,
            Self::MissingInBroker | Self::MissingInSystem | Self::QuantityMismatch => {
                DiscrepancySeverity::Critical
            }
        }
    }

    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingInBroker => "missing_in_broker",
            Self::MissingInSystem => "missing_in_system",
            Self::QuantityMismatch => "quantity_mismatch",
            Self::PriceMismatch => "price_mismatch",
        }
    }
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
pub enum DiscrepancySeverity {
    /// Warning, may need attention.
    Warning,
    /// Critical, requires immediate action.
    Critical,
}

/// A detected disagreement for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    /// Trading symbol.
    pub symbol: String,
    /// What disagrees.
    pub kind: DiscrepancyKind,
    /// Locally tracked quantity (0 when missing in system).
    pub tracked_quantity: i64,
    /// Broker quantity (0 when missing in broker).
    pub broker_quantity: i64,
    /// Locally tracked average price.
    pub tracked_price: Decimal,
    /// Broker average price.
    pub broker_price: Decimal,
    /// Broker quantity minus tracked quantity.
    pub difference: i64,
    /// Price difference relative to the tracked price, in percent.
    pub difference_pct: Option<Decimal>,
    /// Severity.
    pub severity: DiscrepancySeverity,
    /// Detection time.
    pub detected_at: DateTime<Utc>,
}

impl Discrepancy {
    /// Build a discrepancy, deriving difference and severity.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        kind: DiscrepancyKind,
        (tracked_quantity, tracked_price): (i64, Decimal),
        (broker_quantity, broker_price): (i64, Decimal),
        detected_at: DateTime<Utc>,
    ) -> Self {
        let difference_pct = (kind == DiscrepancyKind::PriceMismatch && tracked_price > Decimal::ZERO)
            .then(|| ((broker_price - tracked_price) / tracked_price * Decimal::ONE_HUNDRED).round_dp(4));

        Self {
            symbol: symbol.into(),
            kind,
            tracked_quantity,
            broker_quantity,
            tracked_price,
            broker_price,
            difference: broker_quantity - tracked_quantity,
            difference_pct,
            severity: kind.severity(),
            detected_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_severity_by_kind() {
        assert_eq!(
            DiscrepancyKind::PriceMismatch.severity(),
            DiscrepancySeverity::Warning
        );
        assert_eq!(
            DiscrepancyKind::QuantityMismatch.severity(),
            DiscrepancySeverity::Critical
        );
        assert!(DiscrepancySeverity::Warning < DiscrepancySeverity::Critical);
    }

    #[test]
    fn test_quantity_difference_is_broker_minus_tracked() {
        let d = Discrepancy::new(
            "RELIANCE",
            DiscrepancyKind::QuantityMismatch,
            (5, dec!(1450)),
            (10, dec!(1450)),
            Utc::now(),
        );
        assert_eq!(d.difference, 5);
        assert_eq!(d.difference_pct, None);
    }

    #[test]
    fn test_price_difference_pct() {
        let d = Discrepancy::new(
            "TCS",
            DiscrepancyKind::PriceMismatch,
            (10, dec!(100)),
            (10, dec!(102.5)),
            Utc::now(),
        );
        assert_eq!(d.difference, 0);
        assert_eq!(d.difference_pct, Some(dec!(2.5)));
    }

    #[test]
    fn test_serialized_kind_name() {
        let json = serde_json::to_string(&DiscrepancyKind::MissingInBroker).unwrap();
        assert_eq!(json, "\"MISSING_IN_BROKER\"");
    }
}
