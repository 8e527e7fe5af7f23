// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::items_after_statements
    )
)]

//! Trading Core - Execution and Risk Control Library
//!
//! The reliability substrate a trading strategy sits on top of.
//!
//! # Components (leaves first)
//!
//! - [`resilience`]: token bucket rate limiter, error classification with
//!   exponential-backoff retry, and a consecutive-failure circuit breaker
//! - [`gateway`]: [`gateway::BrokerGateway`] composes the resilience layers
//!   around a [`broker::BrokerAdapter`]
//! - [`orders`]: order lifecycle manager (submit, poll, cancel on timeout)
//! - [`reconciliation`]: audits tracked positions against the broker
//! - [`capital`]: persisted day-by-day capital recovery ledger
//! - [`discipline`]: rule-based veto layer for candidate trades
//!
//! # Data flow
//!
//! ```text
//! intent -> DisciplineGate -> OrderManager -> BrokerGateway -> broker
//!                 ^                 |
//!                 +--- outcome -----+--> CapitalLedger
//! PositionReconciler (periodic) audits tracked positions vs broker
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod broker;
pub mod capital;
pub mod config;
pub mod discipline;
pub mod error;
pub mod gateway;
pub mod observability;
pub mod orders;
pub mod reconciliation;
pub mod resilience;
pub mod telemetry;

pub use broker::{
    BrokerAdapter, BrokerError, BrokerHealthMonitor, BrokerPosition, OrderKind, OrderRequest,
    OrderSide, OrderStatusReport, ProductType, ScriptedBroker,
};
pub use capital::{CapitalLedger, DailyCapitalRecord, LedgerError, RecoveryBand};
pub use config::{Config, ConfigError, load_config, load_config_from_string};
pub use discipline::{DenialReason, DisciplineGate, EmotionalState, Verdict};
pub use error::ExecutionError;
pub use gateway::{BrokerGateway, GatewayError};
pub use orders::{Order, OrderManager, OrderOutcome, OrderStatus};
pub use reconciliation::{
    Discrepancy, DiscrepancyKind, PositionReconciler, ReconciliationReport, ReconciliationStatus,
    TrackedPosition,
};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ErrorCategory, RetryPolicy, TokenBucket,
};
