//! Circuit breaker for broker calls.
//!
//! Fails fast while the broker is down instead of piling retries onto it.
//!
//! # State Machine
//!
//! ```text
//! CLOSED -> OPEN       (consecutive failures >= failure_threshold)
//! OPEN -> HALF_OPEN    (timeout elapsed since the last failure; one probe admitted)
//! HALF_OPEN -> CLOSED  (probe succeeds, failure counter reset to 0)
//! HALF_OPEN -> OPEN    (probe fails)
//! ```
//!
//! Every error returned by the wrapped call counts as a failure, permanent
//! rejections included. Calls rejected by the breaker itself never reach the
//! counter.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::gateway::GatewayError;
use crate::observability::metrics;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without reaching the broker.
    Open,
    /// A single probe call is allowed through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit (default: 5).
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is allowed (default: 60s).
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker for external service calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Service name for logging.
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    rejected_calls: AtomicU64,
    state_transitions: AtomicU64,
}

/// Releases a half-open probe slot if the call future is dropped mid-flight.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().probe_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                probe_in_flight: false,
            }),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Get the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state, applying the OPEN -> HALF_OPEN timeout.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.check_timeout(&mut inner);
        inner.state
    }

    /// Consecutive failures counted so far.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    fn check_timeout(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open
            && inner
                .last_failure
                .is_none_or(|at| at.elapsed() >= self.config.timeout)
        {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    /// Reserve the right to make a call, or report how long until a probe.
    fn admit(&self) -> Result<bool, Duration> {
        let mut inner = self.lock();
        self.check_timeout(&mut inner);
        match inner.state {
            CircuitState::Closed => Ok(false),
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                Ok(true)
            }
            CircuitState::HalfOpen => Err(Duration::ZERO),
            CircuitState::Open => {
                let retry_in = inner.last_failure.map_or(Duration::ZERO, |at| {
                    self.config.timeout.saturating_sub(at.elapsed())
                });
                Err(retry_in)
            }
        }
    }

    /// Run `call` through the breaker.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CircuitOpen`] without invoking `call` while the
    /// circuit is open (or a half-open probe is already in flight); otherwise
    /// whatever `call` returns.
    pub async fn call<T, F, Fut>(&self, call: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let is_probe = match self.admit() {
            Ok(is_probe) => is_probe,
            Err(retry_in) => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                metrics::record_circuit_rejected(&self.name);
                tracing::debug!(name = %self.name, "Circuit open, rejecting call");
                return Err(GatewayError::CircuitOpen {
                    name: self.name.clone(),
                    retry_in,
                });
            }
        };

        let mut guard = ProbeGuard {
            breaker: self,
            armed: is_probe,
        };

        let result = call().await;
        guard.armed = false;
        drop(guard);

        if result.is_ok() {
            self.record_success();
        } else {
            self.record_failure();
        }
        result
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        inner.probe_in_flight = false;
        inner.failure_count = 0;
        if inner.state != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        inner.probe_in_flight = false;
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        if to == CircuitState::Closed {
            inner.failure_count = 0;
        }
        self.state_transitions.fetch_add(1, Ordering::Relaxed);
        metrics::record_circuit_transition(&self.name, to);

        match to {
            CircuitState::Open => tracing::warn!(
                name = %self.name,
                from = %from,
                to = "OPEN",
                failures = inner.failure_count,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                name = %self.name,
                from = %from,
                to = "HALF_OPEN",
                "Circuit breaker testing"
            ),
            CircuitState::Closed => tracing::info!(
                name = %self.name,
                from = %from,
                to = "CLOSED",
                "Circuit breaker closed"
            ),
        }
    }

    /// Get metrics for this circuit breaker.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let (state, failure_count) = {
            let mut inner = self.lock();
            self.check_timeout(&mut inner);
            (inner.state, inner.failure_count)
        };
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state,
            failure_count,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
        }
    }

    /// Force the circuit open (emergency stop).
    pub fn force_open(&self) {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());
        self.transition(&mut inner, CircuitState::Open);
    }

    /// Force the circuit closed (manual recovery).
    pub fn force_close(&self) {
        let mut inner = self.lock();
        inner.probe_in_flight = false;
        self.transition(&mut inner, CircuitState::Closed);
        inner.failure_count = 0;
    }
}

/// Metrics for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Service name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Current consecutive failure count.
    pub failure_count: u32,
    /// Calls that reached the wrapped function.
    pub total_calls: u64,
    /// Calls recorded as failures.
    pub total_failures: u64,
    /// Calls rejected while open.
    pub rejected_calls: u64,
    /// Number of state transitions.
    pub state_transitions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerError;
    use crate::resilience::ErrorCategory;
    use std::sync::atomic::AtomicU32;

    fn make_breaker(threshold: u32, timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                timeout: Duration::from_millis(timeout_ms),
            },
        )
    }

    fn outage() -> GatewayError {
        GatewayError::RetriesExhausted {
            operation: "test",
            category: ErrorCategory::Network,
            attempts: 1,
            source: BrokerError::Connection("refused".into()),
        }
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker.call(|| async { Err::<(), _>(outage()) }).await;
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_is_closed() {
        let breaker = make_breaker(3, 1000);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_exactly_threshold_failures() {
        let breaker = make_breaker(3, 1000);

        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);

        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_invoking() {
        let breaker = make_breaker(1, 1000);
        fail(&breaker).await;

        let invoked = AtomicU32::new(0);
        let result = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, GatewayError>(())
            })
            .await;

        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        match result {
            Err(GatewayError::CircuitOpen { name, retry_in }) => {
                assert_eq!(name, "test");
                assert_eq!(retry_in, Duration::from_millis(1000));
            }
            other => panic!("expected circuit open, got {other:?}"),
        }
        assert_eq!(breaker.metrics().rejected_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_timeout_closes_and_resets() {
        let breaker = make_breaker(2, 500);
        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let result = breaker.call(|| async { Ok::<_, GatewayError>(7) }).await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = make_breaker(1, 500);
        fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(600)).await;

        fail(&breaker).await;

        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let breaker = make_breaker(1, 100);
        fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(100)).await;

        assert_eq!(breaker.admit(), Ok(true));
        assert!(breaker.admit().is_err());

        breaker.record_success();
        assert_eq!(breaker.admit(), Ok(false));
    }

    fn auth_failure() -> GatewayError {
        GatewayError::Permanent {
            operation: "get_positions",
            category: ErrorCategory::Authentication,
            source: BrokerError::AuthenticationFailed("token expired".into()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_trip_at_threshold() {
        let breaker = make_breaker(3, 1000);

        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<(), _>(auth_failure()) }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 2);

        let _ = breaker.call(|| async { Err::<(), _>(auth_failure()) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_permanent_failure_reopens() {
        let breaker = make_breaker(1, 500);
        fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let result = breaker.call(|| async { Err::<(), _>(auth_failure()) }).await;

        assert!(matches!(result, Err(GatewayError::Permanent { .. })));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_count() {
        let breaker = make_breaker(3, 1000);
        fail(&breaker).await;
        fail(&breaker).await;
        let _ = breaker.call(|| async { Ok::<_, GatewayError>(()) }).await;
        fail(&breaker).await;

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_open_and_close() {
        let breaker = make_breaker(5, 1000);

        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.force_close();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().state_transitions, 2);
    }
}
