//! Trading discipline gate.
//!
//! A rule-based veto layer consulted before every new trade. Checks run in a
//! fixed order and the first failure wins:
//!
//! 1. daily trade limit
//! 2. consecutive loss limit (holds until the next daily reset)
//! 3. cooldown after the most recent loss
//! 4. daily drawdown
//! 5. signal confirmation window
//!
//! An allowed trade carries a size multiplier that shrinks after a winning
//! streak and after losses.

mod exits;
mod verdict;

pub use exits::{ExitSignal, check_stop_loss, check_take_profit};
pub use verdict::{DenialReason, EmotionalState, Verdict};

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DisciplineConfig;
use crate::observability::metrics;

#[derive(Debug, Default)]
struct GateState {
    daily_trades: u32,
    consecutive_wins: u32,
    consecutive_losses: u32,
    last_loss_at: Option<DateTime<Utc>>,
    daily_start_capital: Decimal,
    current_capital: Decimal,
    signal_first_seen: HashMap<(String, String), DateTime<Utc>>,
    state: EmotionalState,
}

impl GateState {
    fn daily_return(&self) -> Decimal {
        if self.daily_start_capital > Decimal::ZERO {
            (self.current_capital - self.daily_start_capital) / self.daily_start_capital
        } else {
            Decimal::ZERO
        }
    }

    fn cooldown_remaining(&self, cooldown: Duration, now: DateTime<Utc>) -> Option<Duration> {
        let since = now - self.last_loss_at?;
        (since < cooldown).then(|| cooldown - since)
    }
}

/// Snapshot of the gate for dashboards and end-of-day logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisciplineReport {
    /// Current state.
    pub state: EmotionalState,
    /// Guidance for the current state.
    pub coaching: &'static str,
    /// Trades recorded today.
    pub daily_trades: u32,
    /// Daily trade limit.
    pub max_daily_trades: u32,
    /// Trades left today.
    pub trades_remaining: u32,
    /// Current winning streak.
    pub consecutive_wins: u32,
    /// Current losing streak.
    pub consecutive_losses: u32,
    /// Day's return in percent.
    pub daily_return_pct: Decimal,
    /// Drawdown limit in percent.
    pub max_drawdown_pct: Decimal,
    /// Drawdown left before the gate closes, in percent.
    pub drawdown_remaining_pct: Decimal,
    /// Whether a post-loss cooldown is running.
    pub in_cooldown: bool,
    /// 0 to 100, lower when close to limits.
    pub discipline_score: u32,
}

/// Veto layer in front of order placement.
pub struct DisciplineGate {
    config: DisciplineConfig,
    state: Mutex<GateState>,
}

impl DisciplineGate {
    /// Create a gate with no daily capital set.
    ///
    /// The drawdown check stays inactive until [`Self::reset_daily_stats`].
    pub fn new(config: DisciplineConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GateState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Evaluate a candidate trade at `now`.
    ///
    /// The first sighting of a `(symbol, signal)` pair is recorded and denied.
    pub fn evaluate_at(
        &self,
        symbol: &str,
        signal: &str,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Verdict {
        let mut state = self.lock();
        let verdict = match self.check(&mut state, symbol, signal, now) {
            Err(reason) => Verdict::Denied(reason),
            Ok(()) => {
                let size_multiplier = self.size_multiplier(&state);
                let emotional = if state.consecutive_losses > 0 {
                    EmotionalState::Fearful
                } else if state.consecutive_wins >= self.config.reduce_size_after_wins {
                    EmotionalState::Overconfident
                } else {
                    EmotionalState::Neutral
                };
                Verdict::Allowed {
                    size_multiplier,
                    state: emotional,
                }
            }
        };
        state.state = verdict.state();
        drop(state);

        match verdict {
            Verdict::Denied(reason) => {
                warn!(
                    symbol,
                    signal,
                    confidence,
                    reason = %reason,
                    state = %reason.state(),
                    "Trade denied by discipline gate"
                );
                metrics::record_discipline_denial(reason.code());
            }
            Verdict::Allowed {
                size_multiplier,
                state,
            } => {
                info!(
                    symbol,
                    signal,
                    confidence,
                    size_multiplier = %size_multiplier,
                    state = %state,
                    "Trade allowed by discipline gate"
                );
            }
        }
        verdict
    }

    /// Evaluate a candidate trade now.
    pub fn evaluate(&self, symbol: &str, signal: &str, confidence: f64) -> Verdict {
        self.evaluate_at(symbol, signal, confidence, Utc::now())
    }

    fn check(
        &self,
        state: &mut GateState,
        symbol: &str,
        signal: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DenialReason> {
        if state.daily_trades >= self.config.max_daily_trades {
            return Err(DenialReason::DailyTradeLimit);
        }

        if state.consecutive_losses >= self.config.max_consecutive_losses {
            return Err(DenialReason::ConsecutiveLosses);
        }

        if let Some(remaining) = state.cooldown_remaining(self.config.cooldown(), now) {
            return Err(DenialReason::Cooldown { remaining });
        }

        if state.daily_start_capital > Decimal::ZERO {
            let pnl_pct = state.daily_return();
            if pnl_pct < -self.config.max_drawdown_pct {
                return Err(DenialReason::Drawdown { pnl_pct });
            }
        }

        let key = (symbol.to_string(), signal.to_string());
        let first_seen = *state.signal_first_seen.entry(key).or_insert(now);
        let window = self.config.fomo_window();
        let since = now - first_seen;
        if since < window {
            return Err(DenialReason::SignalUnconfirmed {
                remaining: window - since,
            });
        }

        Ok(())
    }

    fn size_multiplier(&self, state: &GateState) -> Decimal {
        let threshold = self.config.reduce_size_after_wins;
        if state.consecutive_wins >= threshold {
            let steps = Decimal::from(state.consecutive_wins - threshold);
            let reduction = (steps * Decimal::new(1, 1)).min(Decimal::new(3, 1));
            return Decimal::ONE - reduction;
        }
        if state.consecutive_losses > 0 {
            let reduction =
                (Decimal::from(state.consecutive_losses) * Decimal::new(15, 2)).min(Decimal::new(4, 1));
            return Decimal::ONE - reduction;
        }
        Decimal::ONE
    }

    /// Record an executed trade at `now`.
    ///
    /// `pnl` of `None` (an opening trade) leaves the streaks untouched; zero
    /// counts as a loss.
    pub fn record_trade_outcome_at(
        &self,
        symbol: &str,
        signal: &str,
        pnl: Option<Decimal>,
        now: DateTime<Utc>,
    ) {
        let mut state = self.lock();
        state.daily_trades += 1;

        match pnl {
            Some(pnl) if pnl > Decimal::ZERO => {
                state.consecutive_wins += 1;
                state.consecutive_losses = 0;
                info!(symbol, pnl = %pnl, wins = state.consecutive_wins, "Winning trade recorded");
            }
            Some(pnl) => {
                state.consecutive_losses += 1;
                state.consecutive_wins = 0;
                state.last_loss_at = Some(now);
                warn!(symbol, pnl = %pnl, losses = state.consecutive_losses, "Losing trade recorded");
            }
            None => {}
        }

        state
            .signal_first_seen
            .remove(&(symbol.to_string(), signal.to_string()));
    }

    /// Record an executed trade now.
    pub fn record_trade_outcome(&self, symbol: &str, signal: &str, pnl: Option<Decimal>) {
        self.record_trade_outcome_at(symbol, signal, pnl, Utc::now());
    }

    /// Start a new trading day with `start_capital`.
    pub fn reset_daily_stats(&self, start_capital: Decimal) {
        let mut state = self.lock();
        *state = GateState {
            daily_start_capital: start_capital,
            current_capital: start_capital,
            ..GateState::default()
        };
        info!(start_capital = %start_capital, "Discipline stats reset");
    }

    /// Update the day's running capital.
    pub fn update_capital(&self, current: Decimal) {
        self.lock().current_capital = current;
    }

    /// Current state.
    pub fn state(&self) -> EmotionalState {
        self.lock().state
    }

    /// Report as of `now`.
    pub fn report_at(&self, now: DateTime<Utc>) -> DisciplineReport {
        let state = self.lock();
        let cfg = &self.config;
        let daily_return = state.daily_return();
        let max_drawdown = cfg.max_drawdown_pct;

        let drawdown_remaining = if daily_return < Decimal::ZERO {
            max_drawdown + daily_return
        } else {
            max_drawdown
        };

        let mut score: u32 = 100;
        if Decimal::from(state.daily_trades) > Decimal::from(cfg.max_daily_trades) * Decimal::new(8, 1) {
            score -= 20;
        }
        if Decimal::from(state.consecutive_losses)
            > Decimal::from(cfg.max_consecutive_losses) * Decimal::new(5, 1)
        {
            score -= 30;
        }
        if state.consecutive_wins > cfg.reduce_size_after_wins {
            score -= 10;
        }
        if state.current_capital
            < state.daily_start_capital * (Decimal::ONE - max_drawdown * Decimal::new(5, 1))
        {
            score -= 25;
        }

        DisciplineReport {
            state: state.state,
            coaching: state.state.coaching(),
            daily_trades: state.daily_trades,
            max_daily_trades: cfg.max_daily_trades,
            trades_remaining: cfg.max_daily_trades.saturating_sub(state.daily_trades),
            consecutive_wins: state.consecutive_wins,
            consecutive_losses: state.consecutive_losses,
            daily_return_pct: (daily_return * Decimal::ONE_HUNDRED).round_dp(2),
            max_drawdown_pct: max_drawdown * Decimal::ONE_HUNDRED,
            drawdown_remaining_pct: (drawdown_remaining * Decimal::ONE_HUNDRED).round_dp(2),
            in_cooldown: state.cooldown_remaining(cfg.cooldown(), now).is_some(),
            discipline_score: score,
        }
    }

    /// Report as of now.
    pub fn report(&self) -> DisciplineReport {
        self.report_at(Utc::now())
    }
}
