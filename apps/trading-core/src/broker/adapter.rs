//! Broker adapter trait definition.
//!
//! This module defines the `BrokerAdapter` trait that all broker integrations
//! must implement. The core treats every call as possibly slow, possibly
//! failing and possibly rate-limited; resilience is layered on top by
//! [`crate::gateway::BrokerGateway`], so implementations should stay thin.

use async_trait::async_trait;

use super::{BrokerError, BrokerPosition, OrderRequest, OrderStatusReport};

/// Trait for broker adapters.
///
/// # Error Handling
///
/// Implementations should map failures onto the most specific
/// [`BrokerError`] variant available. Classification into retryable and
/// permanent failures keys off the variant first and the message second, so
/// `BrokerError::Other` with a vague message is always treated as retryable.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Place a single order.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The broker's order identifier
    /// * `Err(BrokerError)` - The broker did not accept the request
    async fn submit_order(&self, request: &OrderRequest) -> Result<String, BrokerError>;

    /// Get current order status from broker.
    ///
    /// # Arguments
    ///
    /// * `order_id` - Broker's unique identifier for the order
    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport, BrokerError>;

    /// Cancel an open order.
    ///
    /// A successful return only means the broker accepted the cancel request.
    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    /// Fetch the broker's net positions.
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    /// Get the broker name for logging and metrics.
    fn broker_name(&self) -> &'static str;

    /// Lightweight connectivity probe.
    ///
    /// Typically a profile or clock request that is cheap for the broker.
    async fn health_check(&self) -> Result<(), BrokerError>;
}
