//! Reconciliation configuration for periodic broker position audits.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Position reconciliation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Enable periodic reconciliation.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Relative average-price tolerance (0.01 = 1%).
    #[serde(default = "default_tolerance")]
    pub reconciliation_tolerance: Decimal,
    /// Periodic reconciliation interval in seconds.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Discrepancies kept in history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            reconciliation_tolerance: default_tolerance(),
            interval_secs: default_interval(),
            history_limit: default_history_limit(),
        }
    }
}

impl ReconciliationConfig {
    /// Periodic interval as a duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

const fn default_enabled() -> bool {
    true
}

const fn default_tolerance() -> Decimal {
    Decimal::from_parts(1, 0, 0, false, 2)
}

const fn default_interval() -> u64 {
    300
}

const fn default_history_limit() -> usize {
    1000
}
