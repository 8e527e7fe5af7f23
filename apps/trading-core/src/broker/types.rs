//! Wire types and errors for broker operations.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orders::OrderStatus;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    /// Execute at the best available price.
    Market,
    /// Execute at the limit price or better.
    Limit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Product type, i.e. how the broker margins and settles the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProductType {
    /// Intraday, squared off the same session.
    #[default]
    #[serde(rename = "MIS")]
    Intraday,
    /// Delivery, carried overnight.
    #[serde(rename = "CNC")]
    Delivery,
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intraday => write!(f, "MIS"),
            Self::Delivery => write!(f, "CNC"),
        }
    }
}

/// A request to place one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Trading symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Number of shares.
    pub quantity: u32,
    /// Market or limit.
    pub kind: OrderKind,
    /// Intraday or delivery.
    pub product: ProductType,
    /// Limit price, required for limit orders.
    pub limit_price: Option<Decimal>,
}

impl OrderRequest {
    /// Create a market order request.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: u32) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            kind: OrderKind::Market,
            product: ProductType::default(),
            limit_price: None,
        }
    }

    /// Create a limit order request.
    #[must_use]
    pub fn limit(symbol: impl Into<String>, side: OrderSide, quantity: u32, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            kind: OrderKind::Limit,
            product: ProductType::default(),
            limit_price: Some(price),
        }
    }

    /// Set the product type.
    #[must_use]
    pub const fn with_product(mut self, product: ProductType) -> Self {
        self.product = product;
        self
    }

    /// Check the request is well formed before it goes anywhere near the broker.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol must not be empty".to_string());
        }
        if self.quantity == 0 {
            return Err("quantity must be positive".to_string());
        }
        match (self.kind, self.limit_price) {
            (OrderKind::Limit, None) => Err("limit order requires a limit price".to_string()),
            (OrderKind::Limit, Some(price)) if price <= Decimal::ZERO => {
                Err(format!("limit price must be positive, got {price}"))
            }
            (OrderKind::Market, Some(_)) => {
                Err("market order must not carry a limit price".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Broker's view of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    /// Current status.
    pub status: OrderStatus,
    /// Quantity filled so far.
    pub filled_quantity: u32,
    /// Average fill price (zero while unfilled).
    pub average_price: Decimal,
    /// Broker message, typically the rejection reason.
    pub status_message: Option<String>,
}

impl OrderStatusReport {
    /// A report for an order that has not filled yet.
    #[must_use]
    pub const fn unfilled(status: OrderStatus) -> Self {
        Self {
            status,
            filled_quantity: 0,
            average_price: Decimal::ZERO,
            status_message: None,
        }
    }

    /// A report for a fully filled order.
    #[must_use]
    pub const fn filled(quantity: u32, average_price: Decimal) -> Self {
        Self {
            status: OrderStatus::Complete,
            filled_quantity: quantity,
            average_price,
            status_message: None,
        }
    }

    /// A rejection report with the broker's reason.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: OrderStatus::Rejected,
            filled_quantity: 0,
            average_price: Decimal::ZERO,
            status_message: Some(reason.into()),
        }
    }
}

/// Net position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPosition {
    /// Trading symbol.
    pub symbol: String,
    /// Signed net quantity (negative for short).
    pub quantity: i64,
    /// Average entry price.
    pub average_price: Decimal,
}

impl BrokerPosition {
    /// Create a broker position.
    #[must_use]
    pub fn new(symbol: impl Into<String>, quantity: i64, average_price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            average_price,
        }
    }
}

/// Errors from broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Request timed out.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Connection could not be established or was dropped.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Broker told us to slow down.
    #[error("Rate limited by broker")]
    RateLimited {
        /// Seconds to wait before retrying, if the broker said.
        retry_after_secs: Option<u64>,
    },

    /// Local rate limiter could not grant a permit in time.
    #[error("Local rate limit: no permit within acquire timeout")]
    Throttled,

    /// Authentication failed or the session token is invalid.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Not enough funds or margin for the order.
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Request parameters were rejected (bad symbol, bad quantity, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Broker returned a status string we do not model.
    #[error("Unrecognized order status: {0}")]
    UnrecognizedStatus(String),

    /// API returned an error.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code from broker.
        code: String,
        /// Error message from broker.
        message: String,
    },

    /// Anything else.
    #[error("{0}")]
    Other(String),
}
