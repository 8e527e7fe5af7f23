//! Prometheus metrics for the trading core.
//!
//! Covers the broker gateway (rate limiting, retries, circuit breaker), order
//! lifecycle, position reconciliation, capital and the discipline gate.
//! Recording is a no-op until a recorder is installed, so components call
//! these freely.
//!
//! # Example
//!
//! ```ignore
//! use trading_core::config::MetricsConfig;
//! use trading_core::observability::{init_metrics, metrics};
//!
//! init_metrics(&MetricsConfig { enabled: true, ..Default::default() })?;
//! metrics::record_order_submission("scripted", "market");
//! ```

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::resilience::CircuitState;

/// Latency buckets from 1ms to 60s; order fills can take tens of seconds.
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Initialize the Prometheus metrics exporter.
///
/// Starts an HTTP listener exposing `/metrics` when `config.enabled` is set;
/// otherwise does nothing.
///
/// # Errors
///
/// Returns an error if the listen address is invalid or the exporter fails to
/// start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        tracing::debug!("Metrics exporter disabled");
        return Ok(());
    }

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|e| MetricsError::Configuration(format!("{}: {e}", config.listen_addr)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(LATENCY_BUCKETS)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %addr, "Prometheus metrics exporter started");

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Gateway Metrics
// ============================================================================

/// Record a gateway call and its latency.
///
/// * `status` - `"ok"` or the error category (e.g. `"network_error"`)
pub fn record_gateway_call(broker: &str, operation: &str, status: &str, latency_seconds: f64) {
    counter!(
        "gateway_calls_total",
        "broker" => broker.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "gateway_call_latency_seconds",
        "broker" => broker.to_string(),
        "operation" => operation.to_string()
    )
    .record(latency_seconds);
}

/// Record a request that could not obtain a rate-limit permit in time.
pub fn record_rate_limited(broker: &str) {
    counter!("rate_limiter_rejections_total", "broker" => broker.to_string()).increment(1);
}

/// Record a retry attempt after a transient failure.
pub fn record_retry(operation: &str, category: &str) {
    counter!(
        "retry_attempts_total",
        "operation" => operation.to_string(),
        "category" => category.to_string()
    )
    .increment(1);
}

/// Gauge values for circuit breaker state.
pub mod circuit_breaker_state {
    /// Circuit is closed (healthy).
    pub const CLOSED: f64 = 0.0;
    /// Circuit is open (failing).
    pub const OPEN: f64 = 1.0;
    /// Circuit is half-open (probing).
    pub const HALF_OPEN: f64 = 2.0;
}

const fn circuit_state_value(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => circuit_breaker_state::CLOSED,
        CircuitState::Open => circuit_breaker_state::OPEN,
        CircuitState::HalfOpen => circuit_breaker_state::HALF_OPEN,
    }
}

/// Record a circuit breaker state change.
pub fn record_circuit_transition(name: &str, to: CircuitState) {
    gauge!("circuit_breaker_state", "name" => name.to_string()).set(circuit_state_value(to));

    counter!(
        "circuit_breaker_transitions_total",
        "name" => name.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

/// Record a call rejected because the circuit was open.
pub fn record_circuit_rejected(name: &str) {
    counter!("circuit_breaker_rejected_total", "name" => name.to_string()).increment(1);
}

/// Record a broker health probe result.
pub fn record_health_check(broker: &str, healthy: bool) {
    counter!(
        "broker_health_checks_total",
        "broker" => broker.to_string(),
        "healthy" => healthy.to_string()
    )
    .increment(1);
}

// ============================================================================
// Order Lifecycle Metrics
// ============================================================================

/// Record an order accepted by the broker.
pub fn record_order_submission(broker: &str, order_kind: &str) {
    counter!(
        "order_submissions_total",
        "broker" => broker.to_string(),
        "order_kind" => order_kind.to_string()
    )
    .increment(1);
}

/// Record the final outcome of an order.
///
/// * `outcome` - `"complete"`, `"rejected"`, `"cancelled"` or `"timeout"`
/// * `latency_seconds` - Time from submission to the outcome
pub fn record_order_outcome(broker: &str, outcome: &str, latency_seconds: f64) {
    counter!(
        "order_outcomes_total",
        "broker" => broker.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        "order_latency_seconds",
        "broker" => broker.to_string(),
        "outcome" => outcome.to_string()
    )
    .record(latency_seconds);
}

/// Update the active orders gauge.
pub fn update_active_orders(broker: &str, count: usize) {
    gauge!("active_orders", "broker" => broker.to_string()).set(count as f64);
}

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Record a reconciliation run.
///
/// * `status` - `"ok"`, `"mismatch"` or `"skipped"`
pub fn record_reconciliation(status: &str, duration_seconds: f64) {
    counter!("reconciliation_runs_total", "status" => status.to_string()).increment(1);
    histogram!("reconciliation_duration_seconds").record(duration_seconds);
}

/// Record a detected position discrepancy.
pub fn record_discrepancy(kind: &str) {
    counter!("position_discrepancies_total", "kind" => kind.to_string()).increment(1);
}

// ============================================================================
// Capital & Discipline Metrics
// ============================================================================

/// Update the capital available for the next session.
pub fn update_available_capital(capital: f64) {
    gauge!("available_capital").set(capital);
}

/// Record a trade denied by the discipline gate.
pub fn record_discipline_denial(reason: &str) {
    counter!("discipline_denials_total", "reason" => reason.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_are_sorted() {
        assert!(LATENCY_BUCKETS.windows(2).all(|w| w[0] < w[1]));
        assert!((LATENCY_BUCKETS[0] - 0.001).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disabled_metrics_is_noop() {
        let config = MetricsConfig::default();
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_invalid_listen_addr_is_configuration_error() {
        let config = MetricsConfig {
            enabled: true,
            listen_addr: "not-an-address".to_string(),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(MetricsError::Configuration(_))
        ));
    }

    #[test]
    fn test_circuit_state_values() {
        let cases = [
            (CircuitState::Closed, circuit_breaker_state::CLOSED),
            (CircuitState::Open, circuit_breaker_state::OPEN),
            (CircuitState::HalfOpen, circuit_breaker_state::HALF_OPEN),
        ];
        for (state, expected) in cases {
            assert!((circuit_state_value(state) - expected).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_recording_without_recorder_does_not_panic() {
        // Actual metric recording requires an installed recorder
        record_gateway_call("scripted", "submit_order", "ok", 0.015);
        record_rate_limited("scripted");
        record_retry("get_positions", "network_error");
        record_circuit_transition("scripted", CircuitState::Open);
        record_circuit_rejected("scripted");
        record_health_check("scripted", false);
        record_order_submission("scripted", "limit");
        record_order_outcome("scripted", "complete", 2.5);
        update_active_orders("scripted", 3);
        record_reconciliation("mismatch", 0.2);
        record_discrepancy("quantity_mismatch");
        update_available_capital(920.0);
        record_discipline_denial("cooldown");
    }
}
