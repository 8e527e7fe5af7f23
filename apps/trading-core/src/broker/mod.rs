//! Broker collaborator boundary.
//!
//! Everything the core knows about the remote broker lives here:
//!
//! - [`adapter`]: the `BrokerAdapter` trait every broker integration implements
//! - [`types`]: request/response wire types and `BrokerError`
//! - [`mock`]: a scripted broker for tests and paper runs
//! - [`health`]: periodic health checks with exponential backoff

mod adapter;
mod health;
mod mock;
mod types;

pub use adapter::BrokerAdapter;
pub use health::{BrokerHealthMonitor, HealthCheckOutcome, HealthStatus};
pub use mock::ScriptedBroker;
pub use types::{
    BrokerError, BrokerPosition, OrderKind, OrderRequest, OrderSide, OrderStatusReport,
    ProductType,
};
