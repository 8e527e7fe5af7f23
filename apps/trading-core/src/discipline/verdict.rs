//! Gate decisions.

use std::fmt;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::Serialize;

/// Behavioural state inferred from recent activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalState {
    /// No pressure detected.
    #[default]
    Neutral,
    /// Recent losses or drawdown.
    Fearful,
    /// Trading past the daily limit.
    Greedy,
    /// Chasing losses.
    Revenge,
    /// Extended winning streak.
    Overconfident,
    /// Reacting to a fresh signal.
    Fomo,
}

impl EmotionalState {
    /// Lowercase label for logs and reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Fearful => "fearful",
            Self::Greedy => "greedy",
            Self::Revenge => "revenge",
            Self::Overconfident => "overconfident",
            Self::Fomo => "fomo",
        }
    }

    /// Guidance for the operator in this state.
    #[must_use]
    pub const fn coaching(&self) -> &'static str {
        match self {
            Self::Neutral => {
                "Neutral: trading with discipline. Keep following the plan objectively."
            }
            Self::Fearful => {
                "Fear detected: losses are part of trading. The strategy has rules for a reason; trust the system."
            }
            Self::Greedy => {
                "Greed warning: daily trade limit hit. More trades do not mean more profit."
            }
            Self::Revenge => {
                "Revenge trading blocked: step away. Trading to win losses back leads to more losses."
            }
            Self::Overconfident => {
                "Overconfidence check: a winning streak does not change the odds. Stick to position sizing rules."
            }
            Self::Fomo => {
                "FOMO prevention: a real opportunity will still be there after confirmation."
            }
        }
    }
}

impl fmt::Display for EmotionalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a trade was vetoed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// Daily trade count reached.
    DailyTradeLimit,
    /// Too many losses in a row.
    ConsecutiveLosses,
    /// Still inside the post-loss cooldown.
    Cooldown {
        /// Time left.
        remaining: Duration,
    },
    /// Daily drawdown past the limit.
    Drawdown {
        /// Day's return as a fraction of starting capital.
        pnl_pct: Decimal,
    },
    /// The signal has not persisted long enough.
    SignalUnconfirmed {
        /// Time left before it counts as confirmed.
        remaining: Duration,
    },
}

impl DenialReason {
    /// Stable reason code for metrics.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DailyTradeLimit => "daily_trade_limit",
            Self::ConsecutiveLosses => "consecutive_losses",
            Self::Cooldown { .. } => "cooldown",
            Self::Drawdown { .. } => "drawdown",
            Self::SignalUnconfirmed { .. } => "signal_unconfirmed",
        }
    }

    /// State the gate moves to when denying for this reason.
    #[must_use]
    pub const fn state(&self) -> EmotionalState {
        match self {
            Self::DailyTradeLimit => EmotionalState::Greedy,
            Self::ConsecutiveLosses => EmotionalState::Revenge,
            Self::Cooldown { .. } | Self::Drawdown { .. } => EmotionalState::Fearful,
            Self::SignalUnconfirmed { .. } => EmotionalState::Fomo,
        }
    }
}

fn minutes(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 60_000.0
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyTradeLimit => f.write_str("daily trade limit reached"),
            Self::ConsecutiveLosses => f.write_str("consecutive loss limit reached"),
            Self::Cooldown { remaining } => {
                write!(f, "cooldown active ({:.1} min remaining)", minutes(*remaining))
            }
            Self::Drawdown { pnl_pct } => write!(
                f,
                "max daily drawdown reached ({}%)",
                (pnl_pct * Decimal::ONE_HUNDRED).round_dp(2)
            ),
            Self::SignalUnconfirmed { remaining } => write!(
                f,
                "signal unconfirmed ({:.1} min remaining)",
                minutes(*remaining)
            ),
        }
    }
}

/// Outcome of [`super::DisciplineGate::evaluate_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Trade may proceed, scaled by `size_multiplier`.
    Allowed {
        /// Position size multiplier in `(0, 1]`.
        size_multiplier: Decimal,
        /// State after evaluation.
        state: EmotionalState,
    },
    /// Trade vetoed.
    Denied(DenialReason),
}

impl Verdict {
    /// Whether the trade may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Size multiplier, zero when denied.
    #[must_use]
    pub const fn size_multiplier(&self) -> Decimal {
        match self {
            Self::Allowed {
                size_multiplier, ..
            } => *size_multiplier,
            Self::Denied(_) => Decimal::ZERO,
        }
    }

    /// State after evaluation.
    #[must_use]
    pub const fn state(&self) -> EmotionalState {
        match self {
            Self::Allowed { state, .. } => *state,
            Self::Denied(reason) => reason.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use super::*;

    #[test_case(EmotionalState::Neutral, "Neutral:" ; "neutral")]
    #[test_case(EmotionalState::Fearful, "Fear detected:" ; "fearful")]
    #[test_case(EmotionalState::Greedy, "Greed warning:" ; "greedy")]
    #[test_case(EmotionalState::Revenge, "Revenge trading blocked:" ; "revenge")]
    #[test_case(EmotionalState::Overconfident, "Overconfidence check:" ; "overconfident")]
    #[test_case(EmotionalState::Fomo, "FOMO prevention:" ; "fomo")]
    fn test_coaching_message_per_state(state: EmotionalState, prefix: &str) {
        assert!(state.coaching().starts_with(prefix), "{}", state.coaching());
    }

    #[test]
    fn test_denied_has_zero_multiplier() {
        let verdict = Verdict::Denied(DenialReason::DailyTradeLimit);
        assert!(!verdict.is_allowed());
        assert_eq!(verdict.size_multiplier(), Decimal::ZERO);
        assert_eq!(verdict.state(), EmotionalState::Greedy);
    }

    #[test]
    fn test_denial_display() {
        let reason = DenialReason::Cooldown {
            remaining: Duration::seconds(90),
        };
        assert_eq!(reason.to_string(), "cooldown active (1.5 min remaining)");

        let reason = DenialReason::Drawdown {
            pnl_pct: dec!(-0.0612),
        };
        assert_eq!(reason.to_string(), "max daily drawdown reached (-6.12%)");
        assert_eq!(reason.code(), "drawdown");
    }
}
