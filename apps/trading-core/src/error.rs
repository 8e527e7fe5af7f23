//! Crate-level error taxonomy.
//!
//! Lower layers keep their own enums ([`crate::BrokerError`],
//! [`crate::GatewayError`], [`crate::LedgerError`]); [`ExecutionError`] is
//! what the order manager, reconciler and ledger hand back to the trading
//! loop, carrying order id and symbol where known.
//!
//! | Variant | Caller action |
//! |---------|---------------|
//! | `Gateway` (transient) | retry later or route elsewhere |
//! | `Gateway` (permanent), `InvalidOrder`, `OrderRejected` | fix the request |
//! | `OrderTimeout` | check the broker order book before retrying |
//! | `PositionMismatch`, `Ledger`, `IllegalTransition` | halt and alert |

use std::time::Duration;

use thiserror::Error;

use crate::capital::LedgerError;
use crate::gateway::GatewayError;
use crate::orders::OrderStatus;
use crate::resilience::ErrorCategory;

/// Errors returned by the execution layer.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The broker gateway failed for an operation on `symbol`.
    #[error("Broker call for {symbol} failed: {source}")]
    Gateway {
        /// Symbol the operation concerned.
        symbol: String,
        /// Gateway failure.
        #[source]
        source: GatewayError,
    },

    /// The order request failed local validation.
    #[error("Invalid order for {symbol}: {reason}")]
    InvalidOrder {
        /// Symbol of the rejected request.
        symbol: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Generic order placement failure.
    #[error("Order error: {0}")]
    Order(String),

    /// The broker rejected or cancelled the order.
    #[error("Order {order_id} for {symbol} {status}: {reason}")]
    OrderRejected {
        /// Broker order id.
        order_id: String,
        /// Symbol.
        symbol: String,
        /// Terminal status (`REJECTED` or `CANCELLED`).
        status: OrderStatus,
        /// Broker status message.
        reason: String,
    },

    /// The order did not reach a terminal state in time.
    #[error("Order {order_id} for {symbol} timed out after {elapsed:?} ({attempts} polls)")]
    OrderTimeout {
        /// Broker order id.
        order_id: String,
        /// Symbol.
        symbol: String,
        /// Time spent waiting.
        elapsed: Duration,
        /// Status polls made.
        attempts: u32,
    },

    /// Tracked positions disagree with the broker.
    #[error("Position mismatch: {mismatched} discrepancies ({symbols})")]
    PositionMismatch {
        /// Number of discrepancies.
        mismatched: usize,
        /// Comma-separated affected symbols.
        symbols: String,
    },

    /// Capital ledger persistence failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A status update would move an order out of a terminal state.
    #[error("Illegal transition for order {order_id}: {from} -> {to}")]
    IllegalTransition {
        /// Broker order id.
        order_id: String,
        /// Current status.
        from: OrderStatus,
        /// Rejected status.
        to: OrderStatus,
    },
}

impl ExecutionError {
    /// Failure category, for deciding between retry, fix and halt.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Gateway { source, .. } => match source.category() {
                Some(category) => category,
                None => ErrorCategory::Network,
            },
            Self::InvalidOrder { .. } => ErrorCategory::InvalidInput,
            Self::OrderRejected { .. } => ErrorCategory::Client,
            Self::OrderTimeout { .. } => ErrorCategory::Network,
            Self::Order(_)
            | Self::PositionMismatch { .. }
            | Self::Ledger(_)
            | Self::IllegalTransition { .. } => ErrorCategory::Unknown,
        }
    }

    /// Whether the same request may succeed if tried again later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway { source, .. } => source.is_transient(),
            Self::OrderTimeout { .. } => true,
            _ => false,
        }
    }

    /// Whether the trading loop should stop and alert an operator.
    #[must_use]
    pub const fn requires_halt(&self) -> bool {
        matches!(
            self,
            Self::PositionMismatch { .. } | Self::Ledger(_) | Self::IllegalTransition { .. }
        )
    }

    /// Stable reason code for logs and alerts.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Gateway { .. } => "BROKER_API_ERROR",
            Self::InvalidOrder { .. } => "INVALID_ORDER_PARAMS",
            Self::Order(_) => "ORDER_ERROR",
            Self::OrderRejected { .. } => "ORDER_REJECTED",
            Self::OrderTimeout { .. } => "ORDER_TIMEOUT",
            Self::PositionMismatch { .. } => "POSITION_MISMATCH",
            Self::Ledger(_) => "LEDGER_ERROR",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
        }
    }
}
