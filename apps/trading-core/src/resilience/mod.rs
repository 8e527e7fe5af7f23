//! Resilience patterns for broker calls.
//!
//! - [`rate_limiter`]: token bucket bounding the outbound call rate
//! - [`retry`]: failure classification and exponential-backoff retry
//! - [`circuit_breaker`]: fail fast while the broker is down

mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
pub use rate_limiter::{RateLimiterStats, TokenBucket};
pub use retry::{
    BackoffCalculator, Classification, ErrorCategory, RetryPolicy, classify_error,
    classify_message, retry_with_backoff,
};
