//! Broker gateway.
//!
//! Every broker call made by the core goes through [`BrokerGateway`], which
//! layers the resilience patterns around the raw [`BrokerAdapter`]:
//!
//! ```text
//! circuit breaker ( retry with backoff ( rate limit acquire -> broker call ) )
//! ```
//!
//! The rate limiter sits innermost so each retry also pays for a permit, and
//! the breaker sits outermost so an exhausted retry loop counts as one
//! outage-shaped failure.
//!
//! The gateway is constructed explicitly and shared by `Arc`; there is no
//! process-wide instance.

mod error;

pub use error::GatewayError;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::broker::{BrokerAdapter, BrokerError, BrokerPosition, OrderRequest, OrderStatusReport};
use crate::config::GatewayConfig;
use crate::observability::metrics;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerMetrics, CircuitState, RateLimiterStats, RetryPolicy,
    TokenBucket, retry_with_backoff,
};

/// Rate-limited, retrying, circuit-broken access to a broker.
pub struct BrokerGateway<B: BrokerAdapter> {
    broker: Arc<B>,
    rate_limiter: TokenBucket,
    retry_policy: RetryPolicy,
    circuit_breaker: CircuitBreaker,
    acquire_timeout: Duration,
}

impl<B: BrokerAdapter> BrokerGateway<B> {
    /// Create a gateway from explicit parts.
    pub fn new(
        broker: Arc<B>,
        rate_limiter: TokenBucket,
        retry_policy: RetryPolicy,
        circuit_breaker: CircuitBreaker,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            rate_limiter,
            retry_policy,
            circuit_breaker,
            acquire_timeout,
        }
    }

    /// Create a gateway from configuration.
    pub fn from_config(broker: Arc<B>, config: &GatewayConfig) -> Self {
        let name = broker.broker_name();
        info!(
            broker = name,
            requests_per_second = config.requests_per_second,
            burst_size = config.burst_size,
            failure_threshold = config.circuit_failure_threshold,
            "Creating broker gateway"
        );
        Self::new(
            broker,
            TokenBucket::new(config.requests_per_second, config.burst_size),
            config.retry.to_policy(),
            CircuitBreaker::new(name, config.circuit_breaker_config()),
            config.acquire_timeout(),
        )
    }

    /// Broker name for logging and metrics.
    pub fn broker_name(&self) -> &'static str {
        self.broker.broker_name()
    }

    /// The underlying broker adapter.
    pub const fn broker(&self) -> &Arc<B> {
        &self.broker
    }

    /// Retry policy applied to retry-wrapped operations.
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        policy: &RetryPolicy,
        call: F,
    ) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BrokerError>>,
    {
        let call = &call;
        let broker = self.broker_name();
        let start = Instant::now();

        let result = self
            .circuit_breaker
            .call(move || {
                retry_with_backoff(policy, operation, move || async move {
                    if !self.rate_limiter.acquire(1, Some(self.acquire_timeout)).await {
                        metrics::record_rate_limited(broker);
                        return Err(BrokerError::Throttled);
                    }
                    call().await
                })
            })
            .await;

        let status = match &result {
            Ok(_) => "ok",
            Err(GatewayError::CircuitOpen { .. }) => "circuit_open",
            Err(GatewayError::Permanent { .. }) => "permanent_error",
            Err(GatewayError::RetriesExhausted { .. }) => "retries_exhausted",
        };
        metrics::record_gateway_call(broker, operation, status, start.elapsed().as_secs_f64());
        debug!(broker, operation, status, "Gateway call finished");

        result
    }

    /// Submit an order (retry-wrapped).
    pub async fn submit_order(&self, request: &OrderRequest) -> Result<String, GatewayError> {
        self.execute("submit_order", &self.retry_policy, || {
            self.broker.submit_order(request)
        })
        .await
    }

    /// Fetch order status (retry-wrapped).
    pub async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport, GatewayError> {
        self.execute("get_order_status", &self.retry_policy, || {
            self.broker.get_order_status(order_id)
        })
        .await
    }

    /// Request cancellation (single attempt, never retried).
    pub async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError> {
        let policy = RetryPolicy::no_retry();
        self.execute("cancel_order", &policy, || self.broker.cancel_order(order_id))
            .await
    }

    /// Fetch broker positions (retry-wrapped).
    pub async fn get_positions(&self) -> Result<Vec<BrokerPosition>, GatewayError> {
        self.execute("get_positions", &self.retry_policy, || {
            self.broker.get_positions()
        })
        .await
    }

    /// Rate-limited connectivity probe (single attempt).
    pub async fn health_check(&self) -> Result<(), GatewayError> {
        let policy = RetryPolicy::no_retry();
        self.execute("health_check", &policy, || self.broker.health_check())
            .await
    }

    /// Current circuit breaker state.
    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    /// Circuit breaker metrics snapshot.
    pub fn circuit_metrics(&self) -> CircuitBreakerMetrics {
        self.circuit_breaker.metrics()
    }

    /// The circuit breaker, for manual override.
    pub const fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Rate limiter statistics.
    pub fn rate_limiter_stats(&self) -> RateLimiterStats {
        self.rate_limiter.stats()
    }
}
