//! Gateway configuration: rate limiting, retry and circuit breaker.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Broker gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Token refill rate.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    /// Bucket capacity; twice the rate when omitted.
    #[serde(default)]
    pub burst_size: Option<u32>,
    /// Longest a call waits for a rate-limit permit (seconds).
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: f64,
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,
    /// Seconds after the last failure before a probe is allowed.
    #[serde(default = "default_circuit_timeout")]
    pub circuit_timeout: u64,
    /// Retry settings.
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: None,
            acquire_timeout: default_acquire_timeout(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_timeout: default_circuit_timeout(),
            retry: RetrySettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Rate-limit acquire timeout.
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        super::secs_to_duration(self.acquire_timeout)
    }

    /// Circuit breaker settings.
    #[must_use]
    pub const fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_failure_threshold,
            timeout: Duration::from_secs(self.circuit_timeout),
        }
    }
}

/// Retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay (milliseconds).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delay multiplier per retry.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Delay ceiling (milliseconds).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor (0 disables).
    #[serde(default)]
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: 0.0,
        }
    }
}

impl RetrySettings {
    /// Convert to the resilience module's `RetryPolicy`.
    #[must_use]
    pub const fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter_factor: self.jitter_factor,
        }
    }
}

const fn default_requests_per_second() -> f64 {
    3.0
}

const fn default_acquire_timeout() -> f64 {
    10.0
}

const fn default_circuit_failure_threshold() -> u32 {
    5
}

const fn default_circuit_timeout() -> u64 {
    60
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_delay_ms() -> u64 {
    1000
}

const fn default_backoff_factor() -> f64 {
    2.0
}

const fn default_max_delay_ms() -> u64 {
    30_000
}
