//! Failure classification and retry with exponential backoff.
//!
//! # Retryable vs permanent
//!
//! | Retryable | Permanent |
//! |-----------|-----------|
//! | Timeouts, connection/network failures | Authentication / invalid token |
//! | Broker "unavailable" | Insufficient funds / margin |
//! | Rate limiting (broker 429 or local throttle) | Invalid symbol / order not found |
//! | HTTP 5xx | HTTP 4xx |
//! | Anything unrecognised | |
//!
//! Permanent failures are surfaced immediately without consuming a retry.
//!
//! # Example
//!
//! ```rust,ignore
//! use trading_core::resilience::{RetryPolicy, retry_with_backoff};
//!
//! let policy = RetryPolicy::default();
//! let positions = retry_with_backoff(&policy, "get_positions", || broker.get_positions()).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::broker::BrokerError;
use crate::config::secs_to_duration;
use crate::gateway::GatewayError;
use crate::observability::metrics;

/// Why a call failed, coarse enough to drive retry and alerting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Timeout, connection or network failure.
    Network,
    /// Throttled by the broker or the local limiter.
    RateLimited,
    /// Broker-side 5xx.
    Server,
    /// Nothing recognisable; retried conservatively.
    Unknown,
    /// Bad credentials or expired session.
    Authentication,
    /// Not enough funds or margin.
    InsufficientFunds,
    /// Bad symbol, unknown order or malformed parameters.
    InvalidInput,
    /// Other 4xx.
    Client,
}

impl ErrorCategory {
    /// Whether failures in this category are worth retrying.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::RateLimited | Self::Server | Self::Unknown
        )
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network_error",
            Self::RateLimited => "rate_limit",
            Self::Server => "server_error",
            Self::Unknown => "unknown_error",
            Self::Authentication => "auth_error",
            Self::InsufficientFunds => "insufficient_funds",
            Self::InvalidInput => "invalid_input",
            Self::Client => "client_error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Worth retrying.
    pub retryable: bool,
    /// Failure category.
    pub category: ErrorCategory,
}

impl From<ErrorCategory> for Classification {
    fn from(category: ErrorCategory) -> Self {
        Self {
            retryable: category.is_retryable(),
            category,
        }
    }
}

/// Classify a broker failure.
///
/// Structured variants decide on their own; free-form messages fall through
/// to [`classify_message`].
#[must_use]
pub fn classify_error(error: &BrokerError) -> Classification {
    let category = match error {
        BrokerError::Timeout(_) | BrokerError::Connection(_) => ErrorCategory::Network,
        BrokerError::RateLimited { .. } | BrokerError::Throttled => ErrorCategory::RateLimited,
        BrokerError::AuthenticationFailed(_) => ErrorCategory::Authentication,
        BrokerError::InsufficientFunds(_) => ErrorCategory::InsufficientFunds,
        BrokerError::InvalidInput(_)
        | BrokerError::OrderNotFound(_)
        | BrokerError::UnrecognizedStatus(_) => ErrorCategory::InvalidInput,
        BrokerError::Http { status: 429, .. } => ErrorCategory::RateLimited,
        BrokerError::Http { status, message } => match *status {
            500..=599 => ErrorCategory::Server,
            400..=499 => {
                let from_message = classify_message(message).category;
                if from_message.is_retryable() {
                    ErrorCategory::Client
                } else {
                    from_message
                }
            }
            _ => classify_message(message).category,
        },
        BrokerError::Api { code, message } => {
            classify_message(&format!("{code} {message}")).category
        }
        BrokerError::Other(message) => classify_message(message).category,
    };
    category.into()
}

/// Classify a failure from its message alone.
///
/// Checks run in order; the first match wins.
#[must_use]
pub fn classify_message(message: &str) -> Classification {
    let lower = message.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    let category = if any(&["timeout", "timed out", "connection", "network", "unavailable"]) {
        ErrorCategory::Network
    } else if any(&["rate limit", "too many requests", "429"]) {
        ErrorCategory::RateLimited
    } else if any(&["invalid token", "authentication", "unauthorized"]) {
        ErrorCategory::Authentication
    } else if any(&["insufficient funds", "margin"]) {
        ErrorCategory::InsufficientFunds
    } else if any(&["invalid symbol", "not found"]) {
        ErrorCategory::InvalidInput
    } else if any(&["500", "502", "503", "504"]) {
        ErrorCategory::Server
    } else if any(&["400", "403", "404"]) {
        ErrorCategory::Client
    } else {
        ErrorCategory::Unknown
    };
    category.into()
}

/// Retry policy for broker calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default: 3).
    pub max_retries: u32,
    /// Delay before the first retry (default: 1s).
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each retry (default: 2.0).
    pub backoff_factor: f64,
    /// Ceiling for any single delay (default: 30s).
    pub max_delay: Duration,
    /// Jitter factor, 0.2 = ±20% (default: 0, deterministic).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Total attempts including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Calculator for exponential backoff with optional jitter.
#[derive(Debug)]
pub struct BackoffCalculator {
    retries_used: u32,
    max_retries: u32,
    next_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    jitter_factor: f64,
}

impl BackoffCalculator {
    /// Create a calculator from a policy.
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            retries_used: 0,
            max_retries: policy.max_retries,
            next_delay: policy.initial_delay.min(policy.max_delay),
            max_delay: policy.max_delay,
            backoff_factor: policy.backoff_factor.max(1.0),
            jitter_factor: policy.jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Delay before the next retry, or `None` once retries are used up.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries_used >= self.max_retries {
            return None;
        }
        self.retries_used += 1;

        let base = self.next_delay;
        self.next_delay =
            secs_to_duration(base.as_secs_f64() * self.backoff_factor).min(self.max_delay);

        Some(self.apply_jitter(base).min(self.max_delay))
    }

    /// Random value in `[delay * (1 - jitter), delay * (1 + jitter)]`.
    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor.is_nan() || self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }
        let secs = delay.as_secs_f64();
        let range = secs * self.jitter_factor.min(1.0);
        let jittered = rand::rng().random_range((secs - range).max(0.0)..=secs + range);
        secs_to_duration(jittered)
    }

    /// Retries used so far.
    #[must_use]
    pub const fn retries_used(&self) -> u32 {
        self.retries_used
    }

    /// Whether another retry is allowed.
    #[must_use]
    pub const fn has_remaining_attempts(&self) -> bool {
        self.retries_used < self.max_retries
    }
}

/// Run `operation`, retrying retryable failures with exponential backoff.
///
/// # Errors
///
/// - [`GatewayError::Permanent`] on the first permanent failure
/// - [`GatewayError::RetriesExhausted`] carrying the last failure once
///   `max_retries` retries have been spent
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    let mut backoff = BackoffCalculator::new(policy);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let error = match call().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(operation, attempts, "Broker call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let Classification {
            retryable,
            category,
        } = classify_error(&error);

        if !retryable {
            warn!(
                operation,
                category = %category,
                error = %error,
                "Permanent broker error, not retrying"
            );
            return Err(GatewayError::Permanent {
                operation,
                category,
                source: error,
            });
        }

        match backoff.next_backoff() {
            Some(delay) => {
                metrics::record_retry(operation, category.as_str());
                warn!(
                    operation,
                    attempt = attempts,
                    max_attempts = policy.max_attempts(),
                    category = %category,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retryable broker error, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                warn!(
                    operation,
                    attempts,
                    category = %category,
                    error = %error,
                    "Broker call failed, retries exhausted"
                );
                return Err(GatewayError::RetriesExhausted {
                    operation,
                    category,
                    attempts,
                    source: error,
                });
            }
        }
    }
}
