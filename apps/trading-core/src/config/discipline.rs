//! Trading discipline gate configuration.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Discipline gate thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisciplineConfig {
    /// Trades allowed per day.
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,
    /// Consecutive losses before trading stops for the day.
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    /// Minutes to wait after a loss.
    #[serde(default = "default_cooldown_after_loss")]
    pub cooldown_after_loss: u32,
    /// Consecutive wins after which position size starts shrinking.
    #[serde(default = "default_reduce_size_after_wins")]
    pub reduce_size_after_wins: u32,
    /// Daily drawdown (fraction of starting capital) that stops trading.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    /// Minutes a signal must persist before it may be traded.
    #[serde(default = "default_fomo_prevention_window")]
    pub fomo_prevention_window: u32,
}

impl Default for DisciplineConfig {
    fn default() -> Self {
        Self {
            max_daily_trades: default_max_daily_trades(),
            max_consecutive_losses: default_max_consecutive_losses(),
            cooldown_after_loss: default_cooldown_after_loss(),
            reduce_size_after_wins: default_reduce_size_after_wins(),
            max_drawdown_pct: default_max_drawdown_pct(),
            fomo_prevention_window: default_fomo_prevention_window(),
        }
    }
}

impl DisciplineConfig {
    /// Cooldown after a loss.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::minutes(i64::from(self.cooldown_after_loss))
    }

    /// Signal confirmation window.
    #[must_use]
    pub fn fomo_window(&self) -> Duration {
        Duration::minutes(i64::from(self.fomo_prevention_window))
    }
}

const fn default_max_daily_trades() -> u32 {
    5
}

const fn default_max_consecutive_losses() -> u32 {
    3
}

const fn default_cooldown_after_loss() -> u32 {
    15
}

const fn default_reduce_size_after_wins() -> u32 {
    3
}

const fn default_max_drawdown_pct() -> Decimal {
    Decimal::from_parts(5, 0, 0, false, 2)
}

const fn default_fomo_prevention_window() -> u32 {
    5
}
