//! Reconciliation report types.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::broker::BrokerPosition;
use crate::error::ExecutionError;

use super::discrepancy::{Discrepancy, DiscrepancySeverity};

/// Overall result of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    /// Every tracked and broker position agrees.
    Ok,
    /// At least one discrepancy was found.
    Mismatch,
    /// Broker positions could not be fetched; nothing was compared.
    Skipped,
}

impl ReconciliationStatus {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Mismatch => "mismatch",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    /// Overall status.
    pub status: ReconciliationStatus,
    /// Tracked positions that agree with the broker.
    pub matched: usize,
    /// Number of discrepancies.
    pub mismatched: usize,
    /// All discrepancies found.
    pub discrepancies: Vec<Discrepancy>,
    /// Positions as fetched from the broker.
    pub broker_positions: Vec<BrokerPosition>,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
    /// Time spent, including the broker fetch.
    pub duration: Duration,
}

impl ReconciliationReport {
    /// A report for a run that could not fetch broker positions.
    #[must_use]
    pub fn skipped(duration: Duration) -> Self {
        Self {
            status: ReconciliationStatus::Skipped,
            matched: 0,
            mismatched: 0,
            discrepancies: Vec::new(),
            broker_positions: Vec::new(),
            completed_at: Utc::now(),
            duration,
        }
    }

    /// Check if there are any critical discrepancies.
    #[must_use]
    pub fn has_critical(&self) -> bool {
        self.discrepancies
            .iter()
            .any(|d| d.severity == DiscrepancySeverity::Critical)
    }

    /// Turn a mismatch into an error, for callers that treat drift as fatal.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::PositionMismatch`] when the status is
    /// `Mismatch`. `Skipped` is not an error.
    pub fn ensure_consistent(&self) -> Result<(), ExecutionError> {
        if self.status != ReconciliationStatus::Mismatch {
            return Ok(());
        }
        let symbols = self
            .discrepancies
            .iter()
            .map(|d| d.symbol.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Err(ExecutionError::PositionMismatch {
            mismatched: self.mismatched,
            symbols,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::reconciliation::DiscrepancyKind;

    fn report_with(discrepancies: Vec<Discrepancy>) -> ReconciliationReport {
        let status = if discrepancies.is_empty() {
            ReconciliationStatus::Ok
        } else {
            ReconciliationStatus::Mismatch
        };
        ReconciliationReport {
            status,
            matched: 0,
            mismatched: discrepancies.len(),
            discrepancies,
            broker_positions: vec![],
            completed_at: Utc::now(),
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_ensure_consistent_lists_symbols() {
        let report = report_with(vec![
            Discrepancy::new(
                "SBIN",
                DiscrepancyKind::MissingInBroker,
                (10, dec!(600)),
                (0, Decimal::ZERO),
                Utc::now(),
            ),
            Discrepancy::new(
                "TCS",
                DiscrepancyKind::PriceMismatch,
                (1, dec!(100)),
                (1, dec!(110)),
                Utc::now(),
            ),
        ]);

        match report.ensure_consistent() {
            Err(ExecutionError::PositionMismatch { mismatched, symbols }) => {
                assert_eq!(mismatched, 2);
                assert_eq!(symbols, "SBIN, TCS");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
        assert!(report.has_critical());
    }

    #[test]
    fn test_ok_and_skipped_are_consistent() {
        assert!(report_with(vec![]).ensure_consistent().is_ok());
        let skipped = ReconciliationReport::skipped(Duration::ZERO);
        assert_eq!(skipped.status, ReconciliationStatus::Skipped);
        assert!(skipped.ensure_consistent().is_ok());
        assert!(!skipped.has_critical());
    }
}
