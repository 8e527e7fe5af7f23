//! Order status in the lifecycle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::broker::BrokerError;

/// Order status as reported by the broker.
///
/// `Complete`, `Rejected` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Submitted, not yet acknowledged by the exchange.
    Pending,
    /// Resting on the exchange.
    Open,
    /// Stop order waiting for its trigger price.
    #[serde(rename = "TRIGGER PENDING", alias = "TRIGGER_PENDING")]
    TriggerPending,
    /// Fully filled.
    Complete,
    /// Rejected by the broker or exchange.
    Rejected,
    /// Cancelled.
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Rejected | Self::Cancelled)
    }

    /// Returns true if the order ended without a fill.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }

    /// Whether an order in this state may move to `next`.
    ///
    /// Repeating the current status is always allowed; nothing leaves a
    /// terminal state and nothing returns to `Pending`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next != Self::Pending
    }

    /// Broker wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Open => "OPEN",
            Self::TriggerPending => "TRIGGER PENDING",
            Self::Complete => "COMPLETE",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = BrokerError;

    /// Parse a broker status string, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('_', " ");
        match normalized.as_str() {
            "PENDING" | "PUT ORDER REQ RECEIVED" | "VALIDATION PENDING" | "OPEN PENDING" => {
                Ok(Self::Pending)
            }
            "OPEN" => Ok(Self::Open),
            "TRIGGER PENDING" => Ok(Self::TriggerPending),
            "COMPLETE" => Ok(Self::Complete),
            "REJECTED" => Ok(Self::Rejected),
            "CANCELLED" | "CANCELED" => Ok(Self::Cancelled),
            _ => Err(BrokerError::UnrecognizedStatus(s.to_string())),
        }
    }
}
