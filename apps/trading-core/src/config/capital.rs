//! Capital recovery ledger configuration.

use std::path::PathBuf;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Capital ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalConfig {
    /// Ceiling on the daily trading budget.
    #[serde(default = "default_max_initial_capital")]
    pub max_initial_capital: Decimal,
    /// Daily loss limit as a fraction of the day's budget.
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,
    /// JSON file holding the daily records.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            max_initial_capital: default_max_initial_capital(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            ledger_path: default_ledger_path(),
        }
    }
}

const fn default_max_initial_capital() -> Decimal {
    Decimal::from_parts(1000, 0, 0, false, 0)
}

const fn default_max_daily_loss_pct() -> Decimal {
    Decimal::from_parts(5, 0, 0, false, 2)
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/capital/capital_history.json")
}
