//! Capital recovery ledger.
//!
//! Each trading day starts with the previous day's ending capital, capped at
//! `max_initial_capital`. Losses shrink the next day's budget; profits
//! restore it up to the cap but never beyond. History is persisted as JSON
//! and rewritten atomically after every change.

mod error;
mod record;

pub use error::LedgerError;
pub use record::{CapitalHistory, DailyCapitalRecord};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::CapitalConfig;
use crate::observability::metrics;

/// How far the budget is below its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryBand {
    /// Trading with the full budget.
    Full,
    /// Deficit under 10% of the ceiling.
    Minor,
    /// Deficit under 50% of the ceiling.
    Moderate,
    /// Deficit of half the ceiling or more.
    Major,
}

impl fmt::Display for RecoveryBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full_capital",
            Self::Minor => "minor_recovery",
            Self::Moderate => "moderate_recovery",
            Self::Major => "major_recovery",
        })
    }
}

/// Capital recovery status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryStatus {
    /// Deficit band.
    pub band: RecoveryBand,
    /// Budget available for the day.
    pub current_capital: Decimal,
    /// Budget ceiling.
    pub max_capital: Decimal,
    /// `max_capital - current_capital`.
    pub deficit: Decimal,
    /// Current capital as a percentage of the ceiling.
    pub recovery_pct: Decimal,
}

/// Overall performance across recorded days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformanceSummary {
    /// Days recorded.
    pub total_days: usize,
    /// Sum of daily P&L.
    pub total_pnl: Decimal,
    /// Mean daily P&L.
    pub avg_daily_pnl: Decimal,
    /// Days with positive P&L.
    pub winning_days: u32,
    /// Days with negative P&L.
    pub losing_days: u32,
    /// Winning days as a percentage of all days.
    pub win_rate_pct: Decimal,
    /// Budget available for the day.
    pub current_capital: Decimal,
    /// Budget ceiling.
    pub max_capital: Decimal,
    /// Current capital as a percentage of the ceiling.
    pub capital_recovery_pct: Decimal,
    /// Trades across all days.
    pub total_trades: u64,
}

fn pct(part: Decimal, whole: Decimal) -> Decimal {
    if whole > Decimal::ZERO {
        (part / whole * Decimal::ONE_HUNDRED).round_dp(2)
    } else {
        Decimal::ZERO
    }
}

/// Persisted day-by-day capital ledger.
pub struct CapitalLedger {
    config: CapitalConfig,
    history: Mutex<CapitalHistory>,
}

impl CapitalLedger {
    /// Open the ledger at `config.ledger_path`.
    ///
    /// A missing file starts an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] if the file cannot be read and
    /// [`LedgerError::Corrupt`] if it does not parse.
    pub fn open(config: CapitalConfig) -> Result<Self, LedgerError> {
        let history = load_history(&config.ledger_path, config.max_initial_capital)?;
        let ledger = Self {
            config,
            history: Mutex::new(history),
        };

        let available = ledger.available_capital();
        info!(
            max_capital = %ledger.config.max_initial_capital,
            available = %available,
            days = ledger.lock().daily_records.len(),
            path = %ledger.config.ledger_path.display(),
            "Capital ledger opened"
        );
        metrics::update_available_capital(available.to_f64().unwrap_or_default());

        Ok(ledger)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CapitalHistory> {
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    fn clamp(&self, amount: Decimal) -> Decimal {
        amount.clamp(Decimal::ZERO, self.config.max_initial_capital)
    }

    fn available_in(&self, history: &CapitalHistory, date: NaiveDate) -> Decimal {
        if let Some(record) = history.record_on(date) {
            return record.starting_capital;
        }
        history
            .last_before(date)
            .map_or(self.config.max_initial_capital, |last| {
                last.ending_capital.min(self.config.max_initial_capital)
            })
    }

    /// Budget for `date`.
    ///
    /// The date's own record wins; otherwise the latest prior day's ending
    /// capital capped at the ceiling; with no history, the ceiling.
    pub fn available_capital_on(&self, date: NaiveDate) -> Decimal {
        self.available_in(&self.lock(), date)
    }

    /// Budget for today (local date).
    pub fn available_capital(&self) -> Decimal {
        self.available_capital_on(Self::today())
    }

    /// Record the end-of-day result for `date` and persist.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the ledger cannot be written. The record
    /// is kept in memory either way.
    pub fn record_day_end_on(
        &self,
        date: NaiveDate,
        daily_pnl: Decimal,
        trades_count: u32,
        used_capital: Decimal,
    ) -> Result<DailyCapitalRecord, LedgerError> {
        let mut history = self.lock();
        let starting = self.available_in(&history, date);
        let ending = self.clamp(starting + daily_pnl);

        let record = DailyCapitalRecord {
            date,
            starting_capital: starting,
            ending_capital: ending,
            daily_pnl,
            pnl_pct: pct(daily_pnl, starting),
            trades_count,
            used_capital,
            capital_utilization_pct: pct(used_capital, starting),
            note: None,
        };
        history.upsert(record.clone());
        history.max_initial_capital = self.config.max_initial_capital;
        let saved = save_history(&self.config.ledger_path, &history);
        drop(history);

        if ending < starting {
            warn!(
                date = %date,
                starting = %starting,
                pnl = %daily_pnl,
                ending = %ending,
                reduced_by = %(starting - ending),
                "Capital reduced for next session"
            );
        } else if starting + daily_pnl > self.config.max_initial_capital {
            info!(
                date = %date,
                starting = %starting,
                pnl = %daily_pnl,
                ending = %ending,
                excess = %(starting + daily_pnl - self.config.max_initial_capital),
                "Capital recovered and capped at max"
            );
        } else {
            info!(
                date = %date,
                starting = %starting,
                pnl = %daily_pnl,
                ending = %ending,
                trades = trades_count,
                "Day end recorded"
            );
        }
        metrics::update_available_capital(ending.to_f64().unwrap_or_default());

        saved.map(|()| record)
    }

    /// Record today's end-of-day result and persist.
    ///
    /// # Errors
    ///
    /// See [`Self::record_day_end_on`].
    pub fn record_day_end(
        &self,
        daily_pnl: Decimal,
        trades_count: u32,
        used_capital: Decimal,
    ) -> Result<DailyCapitalRecord, LedgerError> {
        self.record_day_end_on(Self::today(), daily_pnl, trades_count, used_capital)
    }

    /// Recovery status for `date`.
    pub fn recovery_status_on(&self, date: NaiveDate) -> RecoveryStatus {
        let max = self.config.max_initial_capital;
        let current = self.available_capital_on(date);
        let deficit = max - current;

        let band = if deficit <= Decimal::ZERO {
            RecoveryBand::Full
        } else if deficit < max * Decimal::new(1, 1) {
            RecoveryBand::Minor
        } else if deficit < max * Decimal::new(5, 1) {
            RecoveryBand::Moderate
        } else {
            RecoveryBand::Major
        };

        RecoveryStatus {
            band,
            current_capital: current,
            max_capital: max,
            deficit,
            recovery_pct: pct(current, max),
        }
    }

    /// Recovery status for today.
    pub fn recovery_status(&self) -> RecoveryStatus {
        self.recovery_status_on(Self::today())
    }

    /// Performance across all recorded days, with capital as of `date`.
    pub fn performance_summary_on(&self, date: NaiveDate) -> PerformanceSummary {
        let history = self.lock();
        let current = self.available_in(&history, date);
        let max = self.config.max_initial_capital;
        let total_days = history.daily_records.len();

        let avg_daily_pnl = if total_days == 0 {
            Decimal::ZERO
        } else {
            (history.total_pnl / Decimal::from(total_days)).round_dp(2)
        };

        PerformanceSummary {
            total_days,
            total_pnl: history.total_pnl,
            avg_daily_pnl,
            winning_days: history.winning_days,
            losing_days: history.losing_days,
            win_rate_pct: pct(Decimal::from(history.winning_days), Decimal::from(total_days)),
            current_capital: current,
            max_capital: max,
            capital_recovery_pct: pct(current, max),
            total_trades: history.total_trades,
        }
    }

    /// Performance across all recorded days.
    pub fn performance_summary(&self) -> PerformanceSummary {
        self.performance_summary_on(Self::today())
    }

    /// The last `days` records, oldest first.
    pub fn recent_history(&self, days: usize) -> Vec<DailyCapitalRecord> {
        let history = self.lock();
        let skip = history.daily_records.len().saturating_sub(days);
        history.daily_records[skip..].to_vec()
    }

    /// Manually set the budget for `date` (defaults to the ceiling).
    ///
    /// The amount is clamped to `[0, max_initial_capital]` and stored as a
    /// zero-P&L record tagged with a note.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the ledger cannot be written.
    pub fn force_reset_on(
        &self,
        date: NaiveDate,
        new_capital: Option<Decimal>,
    ) -> Result<DailyCapitalRecord, LedgerError> {
        let amount = self.clamp(new_capital.unwrap_or(self.config.max_initial_capital));
        let record = DailyCapitalRecord {
            date,
            starting_capital: amount,
            ending_capital: amount,
            daily_pnl: Decimal::ZERO,
            pnl_pct: Decimal::ZERO,
            trades_count: 0,
            used_capital: Decimal::ZERO,
            capital_utilization_pct: Decimal::ZERO,
            note: Some("Manual capital reset".to_string()),
        };

        let mut history = self.lock();
        history.upsert(record.clone());
        history.max_initial_capital = self.config.max_initial_capital;
        let saved = save_history(&self.config.ledger_path, &history);
        drop(history);

        warn!(date = %date, capital = %amount, "Manual capital reset");
        metrics::update_available_capital(amount.to_f64().unwrap_or_default());

        saved.map(|()| record)
    }

    /// Manually set today's budget.
    ///
    /// # Errors
    ///
    /// See [`Self::force_reset_on`].
    pub fn force_reset(&self, new_capital: Option<Decimal>) -> Result<DailyCapitalRecord, LedgerError> {
        self.force_reset_on(Self::today(), new_capital)
    }

    /// Largest loss allowed today.
    pub fn daily_loss_limit(&self) -> Decimal {
        self.available_capital() * self.config.max_daily_loss_pct
    }

    /// Whether `daily_pnl` has reached today's loss limit.
    pub fn is_daily_loss_breached(&self, daily_pnl: Decimal) -> bool {
        daily_pnl < Decimal::ZERO && -daily_pnl >= self.daily_loss_limit()
    }

    /// Budget ceiling.
    pub const fn max_initial_capital(&self) -> Decimal {
        self.config.max_initial_capital
    }

    /// Snapshot of the full history document.
    pub fn history(&self) -> CapitalHistory {
        self.lock().clone()
    }
}

fn load_history(path: &Path, max_initial_capital: Decimal) -> Result<CapitalHistory, LedgerError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No capital history found, starting fresh");
            return Ok(CapitalHistory::empty(max_initial_capital));
        }
        Err(source) => {
            return Err(LedgerError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut history: CapitalHistory =
        serde_json::from_str(&contents).map_err(|source| LedgerError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
    history.daily_records.sort_by_key(|r| r.date);
    history.recompute();
    Ok(history)
}

/// Write to a sibling temp file, then rename over the ledger.
fn save_history(path: &Path, history: &CapitalHistory) -> Result<(), LedgerError> {
    let io_err = |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let json = serde_json::to_string_pretty(history).map_err(LedgerError::Serialize)?;
    let tmp_path = temp_path(path);
    fs::write(&tmp_path, json).map_err(io_err)?;
    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        io_err(source)
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    use super::*;

    fn config(dir: &TempDir) -> CapitalConfig {
        CapitalConfig {
            max_initial_capital: dec!(1000),
            max_daily_loss_pct: dec!(0.05),
            ledger_path: dir.path().join("capital").join("capital_history.json"),
        }
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, n).unwrap()
    }

    #[test]
    fn test_fresh_ledger_has_full_capital() {
        let dir = TempDir::new().unwrap();
        let ledger = CapitalLedger::open(config(&dir)).unwrap();

        assert_eq!(ledger.available_capital_on(day(1)), dec!(1000));
        assert_eq!(ledger.recovery_status_on(day(1)).band, RecoveryBand::Full);
        assert_eq!(ledger.performance_summary_on(day(1)).total_days, 0);
    }

    #[test]
    fn test_out_of_order_ledger_file_is_sorted_on_open() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        {
            let ledger = CapitalLedger::open(cfg.clone()).unwrap();
            ledger.record_day_end_on(day(1), dec!(-80), 1, dec!(0)).unwrap();
            ledger.record_day_end_on(day(2), dec!(30), 1, dec!(0)).unwrap();
            ledger.record_day_end_on(day(3), dec!(-50), 1, dec!(0)).unwrap();
        }

        let mut doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&cfg.ledger_path).unwrap()).unwrap();
        doc["daily_records"].as_array_mut().unwrap().reverse();
        fs::write(&cfg.ledger_path, doc.to_string()).unwrap();

        let ledger = CapitalLedger::open(cfg).unwrap();
        let dates: Vec<_> = ledger.history().daily_records.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(1), day(2), day(3)]);
        assert_eq!(ledger.available_capital_on(day(4)), dec!(900));

        let d2 = ledger.record_day_end_on(day(2), dec!(-20), 2, dec!(0)).unwrap();
        assert_eq!(d2.starting_capital, dec!(920));
        assert_eq!(d2.ending_capital, dec!(900));

        let history = ledger.history();
        assert_eq!(history.daily_records.len(), 3);
        assert_eq!(history.total_pnl, dec!(-150));
        assert_eq!(ledger.available_capital_on(day(4)), dec!(900));
    }

    #[test]
    fn test_loss_then_recovery_capped_at_max() {
        let dir = TempDir::new().unwrap();
        let ledger = CapitalLedger::open(config(&dir)).unwrap();

        let d1 = ledger.record_day_end_on(day(1), dec!(-80), 3, dec!(500)).unwrap();
        assert_eq!(d1.ending_capital, dec!(920));
        assert_eq!(d1.pnl_pct, dec!(-8));
        assert_eq!(d1.capital_utilization_pct, dec!(50));

        assert_eq!(ledger.available_capital_on(day(2)), dec!(920));
        let d2 = ledger.record_day_end_on(day(2), dec!(-30), 2, dec!(0)).unwrap();
        assert_eq!(d2.starting_capital, dec!(920));
        assert_eq!(d2.ending_capital, dec!(890));

        let d3 = ledger.record_day_end_on(day(3), dec!(200), 4, dec!(0)).unwrap();
        assert_eq!(d3.starting_capital, dec!(890));
        assert_eq!(d3.ending_capital, dec!(1000));
        assert_eq!(ledger.available_capital_on(day(4)), dec!(1000));
    }

    #[test]
    fn test_ending_capital_never_negative() {
        let dir = TempDir::new().unwrap();
        let ledger = CapitalLedger::open(config(&dir)).unwrap();

        let record = ledger.record_day_end_on(day(1), dec!(-1500), 1, dec!(0)).unwrap();
        assert_eq!(record.ending_capital, Decimal::ZERO);
        assert_eq!(ledger.available_capital_on(day(2)), Decimal::ZERO);
    }

    #[test]
    fn test_same_day_is_upserted() {
        let dir = TempDir::new().unwrap();
        let ledger = CapitalLedger::open(config(&dir)).unwrap();

        ledger.record_day_end_on(day(1), dec!(-50), 1, dec!(0)).unwrap();
        let again = ledger.record_day_end_on(day(1), dec!(-20), 2, dec!(0)).unwrap();

        assert_eq!(again.starting_capital, dec!(1000));
        assert_eq!(again.ending_capital, dec!(980));
        let history = ledger.history();
        assert_eq!(history.daily_records.len(), 1);
        assert_eq!(history.total_pnl, dec!(-20));
        assert_eq!(history.total_trades, 2);
        assert_eq!(history.losing_days, 1);
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let ledger = CapitalLedger::open(config(&dir)).unwrap();
            ledger.record_day_end_on(day(1), dec!(-80), 3, dec!(0)).unwrap();
            ledger.record_day_end_on(day(2), dec!(40), 1, dec!(0)).unwrap();
        }

        let ledger = CapitalLedger::open(config(&dir)).unwrap();
        assert_eq!(ledger.available_capital_on(day(3)), dec!(960));

        let summary = ledger.performance_summary_on(day(3));
        assert_eq!(summary.total_days, 2);
        assert_eq!(summary.total_pnl, dec!(-40));
        assert_eq!(summary.avg_daily_pnl, dec!(-20));
        assert_eq!(summary.winning_days, 1);
        assert_eq!(summary.losing_days, 1);
        assert_eq!(summary.win_rate_pct, dec!(50));
        assert_eq!(summary.total_trades, 4);

        let tmp = temp_path(&config(&dir).ledger_path);
        assert!(!tmp.exists());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        fs::create_dir_all(cfg.ledger_path.parent().unwrap()).unwrap();
        fs::write(&cfg.ledger_path, "{ not json").unwrap();

        let result = CapitalLedger::open(cfg);
        assert!(matches!(result, Err(LedgerError::Corrupt { .. })));
    }

    #[test]
    fn test_recovery_bands() {
        let dir = TempDir::new().unwrap();
        let ledger = CapitalLedger::open(config(&dir)).unwrap();

        ledger.force_reset_on(day(1), Some(dec!(950))).unwrap();
        assert_eq!(ledger.recovery_status_on(day(1)).band, RecoveryBand::Minor);

        ledger.force_reset_on(day(2), Some(dec!(700))).unwrap();
        let status = ledger.recovery_status_on(day(2));
        assert_eq!(status.band, RecoveryBand::Moderate);
        assert_eq!(status.deficit, dec!(300));
        assert_eq!(status.recovery_pct, dec!(70));

        ledger.force_reset_on(day(3), Some(dec!(500))).unwrap();
        assert_eq!(ledger.recovery_status_on(day(3)).band, RecoveryBand::Major);
    }

    #[test]
    fn test_force_reset_is_clamped_and_noted() {
        let dir = TempDir::new().unwrap();
        let ledger = CapitalLedger::open(config(&dir)).unwrap();
        ledger.record_day_end_on(day(1), dec!(-300), 1, dec!(0)).unwrap();

        let record = ledger.force_reset_on(day(2), Some(dec!(5000))).unwrap();
        assert_eq!(record.starting_capital, dec!(1000));
        assert_eq!(record.note.as_deref(), Some("Manual capital reset"));
        assert_eq!(ledger.available_capital_on(day(2)), dec!(1000));

        let record = ledger.force_reset_on(day(3), None).unwrap();
        assert_eq!(record.ending_capital, dec!(1000));
    }

    #[test]
    fn test_recent_history() {
        let dir = TempDir::new().unwrap();
        let ledger = CapitalLedger::open(config(&dir)).unwrap();
        for n in 1..=5 {
            ledger.record_day_end_on(day(n), dec!(1), 1, dec!(0)).unwrap();
        }

        let recent = ledger.recent_history(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].date, day(4));
        assert_eq!(ledger.recent_history(10).len(), 5);
    }

    #[test]
    fn test_daily_loss_limit() {
        let dir = TempDir::new().unwrap();
        let ledger = CapitalLedger::open(config(&dir)).unwrap();

        assert_eq!(ledger.daily_loss_limit(), dec!(50));
        assert!(!ledger.is_daily_loss_breached(dec!(-49.99)));
        assert!(ledger.is_daily_loss_breached(dec!(-50)));
        assert!(!ledger.is_daily_loss_breached(dec!(100)));
    }
}
