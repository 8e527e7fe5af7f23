//! Observability module for metrics.
//!
//! Structured logging is installed by [`crate::telemetry`]; this module owns
//! the Prometheus exporter and the metric names the components record.

pub mod metrics;

pub use metrics::{MetricsError, init_metrics};
