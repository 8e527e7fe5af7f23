//! Error types for gateway operations.

use std::time::Duration;

use crate::broker::BrokerError;
use crate::resilience::ErrorCategory;

/// Errors surfaced by [`super::BrokerGateway`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Failure that retrying cannot fix (auth, funds, bad input, 4xx).
    #[error("{operation} failed permanently ({category}): {source}")]
    Permanent {
        /// Gateway operation name.
        operation: &'static str,
        /// Failure category.
        category: ErrorCategory,
        /// The broker failure.
        #[source]
        source: BrokerError,
    },

    /// Transient failure that persisted through every retry.
    #[error("{operation} failed after {attempts} attempts ({category}): {source}")]
    RetriesExhausted {
        /// Gateway operation name.
        operation: &'static str,
        /// Category of the last failure.
        category: ErrorCategory,
        /// Attempts made, including the first.
        attempts: u32,
        /// The last broker failure.
        #[source]
        source: BrokerError,
    },

    /// Circuit breaker is open, the broker was not called.
    #[error("Circuit breaker '{name}' open, retry in {retry_in:?}")]
    CircuitOpen {
        /// Breaker name.
        name: String,
        /// Time until a probe call will be admitted.
        retry_in: Duration,
    },
}

impl GatewayError {
    /// Failure category; `None` for a fast-failed call.
    #[must_use]
    pub const fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Permanent { category, .. } | Self::RetriesExhausted { category, .. } => {
                Some(*category)
            }
            Self::CircuitOpen { .. } => None,
        }
    }

    /// Whether the caller could reasonably try again later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Permanent { .. })
    }

    /// Whether this failure suggests the broker itself is unhealthy.
    #[must_use]
    pub const fn is_outage(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// The underlying broker failure, if the broker was reached.
    #[must_use]
    pub const fn broker_error(&self) -> Option<&BrokerError> {
        match self {
            Self::Permanent { source, .. } | Self::RetriesExhausted { source, .. } => Some(source),
            Self::CircuitOpen { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_display_and_category() {
        let err = GatewayError::Permanent {
            operation: "submit_order",
            category: ErrorCategory::Authentication,
            source: BrokerError::AuthenticationFailed("token expired".into()),
        };
        assert_eq!(
            err.to_string(),
            "submit_order failed permanently (auth_error): Authentication failed: token expired"
        );
        assert_eq!(err.category(), Some(ErrorCategory::Authentication));
        assert!(!err.is_transient());
        assert!(!err.is_outage());
    }

    #[test]
    fn test_circuit_open_has_no_broker_error() {
        let err = GatewayError::CircuitOpen {
            name: "kite".into(),
            retry_in: Duration::from_secs(3),
        };
        assert!(err.broker_error().is_none());
        assert!(err.is_transient());
        assert!(err.category().is_none());
    }
}
