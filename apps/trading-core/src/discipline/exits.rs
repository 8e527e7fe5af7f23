//! Mechanical exit rules.

use rust_decimal::Decimal;
use serde::Serialize;

/// Exit rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum ExitSignal {
    /// Keep the position.
    Hold {
        /// Return since entry as a fraction.
        return_pct: Decimal,
    },
    /// Profit is at least 80% of the target; tighten the stop.
    NearTarget {
        /// Return since entry as a fraction.
        return_pct: Decimal,
    },
    /// Close the position.
    Exit {
        /// Return since entry as a fraction.
        return_pct: Decimal,
    },
}

impl ExitSignal {
    /// Whether the position should be closed now.
    #[must_use]
    pub const fn should_exit(&self) -> bool {
        matches!(self, Self::Exit { .. })
    }

    /// Return since entry as a fraction.
    #[must_use]
    pub const fn return_pct(&self) -> Decimal {
        match self {
            Self::Hold { return_pct } | Self::NearTarget { return_pct } | Self::Exit { return_pct } => {
                *return_pct
            }
        }
    }
}

fn return_pct(entry_price: Decimal, current_price: Decimal) -> Decimal {
    if entry_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (current_price - entry_price) / entry_price
}

/// Exit once the loss reaches `stop_loss_pct` (a positive fraction).
#[must_use]
pub fn check_stop_loss(
    entry_price: Decimal,
    current_price: Decimal,
    stop_loss_pct: Decimal,
) -> ExitSignal {
    let return_pct = return_pct(entry_price, current_price);
    if return_pct <= -stop_loss_pct {
        ExitSignal::Exit { return_pct }
    } else {
        ExitSignal::Hold { return_pct }
    }
}

/// Exit once the profit reaches `target_pct`; flag 80% of it as near.
#[must_use]
pub fn check_take_profit(
    entry_price: Decimal,
    current_price: Decimal,
    target_pct: Decimal,
) -> ExitSignal {
    let return_pct = return_pct(entry_price, current_price);
    if return_pct >= target_pct {
        ExitSignal::Exit { return_pct }
    } else if return_pct >= target_pct * Decimal::new(8, 1) {
        ExitSignal::NearTarget { return_pct }
    } else {
        ExitSignal::Hold { return_pct }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use super::*;

    #[test_case(dec!(100), dec!(98), true ; "at stop")]
    #[test_case(dec!(100), dec!(97.5), true ; "past stop")]
    #[test_case(dec!(100), dec!(98.5), false ; "within range")]
    #[test_case(dec!(100), dec!(110), false ; "in profit")]
    fn test_stop_loss(entry: Decimal, current: Decimal, exit: bool) {
        assert_eq!(check_stop_loss(entry, current, dec!(0.02)).should_exit(), exit);
    }

    #[test]
    fn test_take_profit_bands() {
        let target = dec!(0.05);
        assert!(matches!(
            check_take_profit(dec!(200), dec!(210), target),
            ExitSignal::Exit { .. }
        ));
        assert_eq!(
            check_take_profit(dec!(200), dec!(208.5), target),
            ExitSignal::NearTarget {
                return_pct: dec!(0.0425)
            }
        );
        assert!(matches!(
            check_take_profit(dec!(200), dec!(205), target),
            ExitSignal::Hold { .. }
        ));
    }

    #[test]
    fn test_zero_entry_price_holds() {
        let signal = check_stop_loss(Decimal::ZERO, dec!(10), dec!(0.02));
        assert_eq!(signal.return_pct(), Decimal::ZERO);
        assert!(!signal.should_exit());
    }
}
