//! Persisted ledger records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One trading day's capital outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCapitalRecord {
    /// Trading day.
    pub date: NaiveDate,
    /// Budget available at the start of the day.
    pub starting_capital: Decimal,
    /// Capital at day end, within `[0, max_initial_capital]`.
    pub ending_capital: Decimal,
    /// Realized profit or loss.
    pub daily_pnl: Decimal,
    /// P&L as a percentage of the starting capital.
    pub pnl_pct: Decimal,
    /// Trades executed.
    pub trades_count: u32,
    /// Capital actively committed to trades.
    pub used_capital: Decimal,
    /// Used capital as a percentage of the starting capital.
    pub capital_utilization_pct: Decimal,
    /// Operator note, set on manual resets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// On-disk ledger document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalHistory {
    /// Budget ceiling in force when last written.
    pub max_initial_capital: Decimal,
    /// Records ordered by date, one per date.
    #[serde(default)]
    pub daily_records: Vec<DailyCapitalRecord>,
    /// Sum of daily P&L.
    #[serde(default)]
    pub total_pnl: Decimal,
    /// Sum of trades across days.
    #[serde(default)]
    pub total_trades: u64,
    /// Days with positive P&L.
    #[serde(default)]
    pub winning_days: u32,
    /// Days with negative P&L.
    #[serde(default)]
    pub losing_days: u32,
}

impl CapitalHistory {
    /// An empty history.
    #[must_use]
    pub const fn empty(max_initial_capital: Decimal) -> Self {
        Self {
            max_initial_capital,
            daily_records: Vec::new(),
            total_pnl: Decimal::ZERO,
            total_trades: 0,
            winning_days: 0,
            losing_days: 0,
        }
    }

    /// Insert or replace the record for its date, keeping date order.
    pub fn upsert(&mut self, record: DailyCapitalRecord) {
        match self
            .daily_records
            .binary_search_by_key(&record.date, |r| r.date)
        {
            Ok(i) => self.daily_records[i] = record,
            Err(i) => self.daily_records.insert(i, record),
        }
        self.recompute();
    }

    /// Recompute aggregates from the records.
    pub fn recompute(&mut self) {
        self.total_pnl = self.daily_records.iter().map(|r| r.daily_pnl).sum();
        self.total_trades = self
            .daily_records
            .iter()
            .map(|r| u64::from(r.trades_count))
            .sum();
        self.winning_days = self
            .daily_records
            .iter()
            .filter(|r| r.daily_pnl > Decimal::ZERO)
            .count() as u32;
        self.losing_days = self
            .daily_records
            .iter()
            .filter(|r| r.daily_pnl < Decimal::ZERO)
            .count() as u32;
    }

    /// The record for `date`, if any.
    #[must_use]
    pub fn record_on(&self, date: NaiveDate) -> Option<&DailyCapitalRecord> {
        self.daily_records.iter().find(|r| r.date == date)
    }

    /// The latest record strictly before `date`.
    #[must_use]
    pub fn last_before(&self, date: NaiveDate) -> Option<&DailyCapitalRecord> {
        self.daily_records.iter().rev().find(|r| r.date < date)
    }
}
