//! Order record tracked by the order manager.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::broker::{OrderKind, OrderRequest, OrderSide, OrderStatusReport, ProductType};
use crate::error::ExecutionError;

use super::OrderStatus;

/// An order placed with the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Broker order id.
    pub order_id: String,
    /// Trading symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Requested quantity.
    pub quantity: u32,
    /// Market or limit.
    pub kind: OrderKind,
    /// Intraday or delivery.
    pub product: ProductType,
    /// Limit price for limit orders.
    pub limit_price: Option<Decimal>,
    /// Last known status.
    pub status: OrderStatus,
    /// When the broker accepted the submission.
    pub submitted_at: DateTime<Utc>,
    /// Quantity filled so far.
    pub filled_quantity: u32,
    /// Average fill price.
    pub average_price: Decimal,
    /// Last broker status message.
    pub status_message: Option<String>,
    /// When the order reached a terminal state or was given up on.
    pub closed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// A freshly submitted order in `Pending`.
    #[must_use]
    pub fn new(order_id: impl Into<String>, request: &OrderRequest, submitted_at: DateTime<Utc>) -> Self {
        Self {
            order_id: order_id.into(),
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            kind: request.kind,
            product: request.product,
            limit_price: request.limit_price,
            status: OrderStatus::Pending,
            submitted_at,
            filled_quantity: 0,
            average_price: Decimal::ZERO,
            status_message: None,
            closed_at: None,
        }
    }

    /// Apply a broker status report.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::IllegalTransition`] if the report would move
    /// the order out of a terminal state; the order is left unchanged.
    pub fn apply_status(&mut self, report: &OrderStatusReport) -> Result<(), ExecutionError> {
        if !self.status.can_transition_to(report.status) {
            return Err(ExecutionError::IllegalTransition {
                order_id: self.order_id.clone(),
                from: self.status,
                to: report.status,
            });
        }
        self.status = report.status;
        self.filled_quantity = report.filled_quantity;
        self.average_price = report.average_price;
        if report.status_message.is_some() {
            self.status_message.clone_from(&report.status_message);
        }
        Ok(())
    }

    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Filled notional value.
    #[must_use]
    pub fn filled_value(&self) -> Decimal {
        self.average_price * Decimal::from(self.filled_quantity)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn order() -> Order {
        let request = OrderRequest::limit("RELIANCE", OrderSide::Buy, 10, dec!(1450));
        Order::new("order-1", &request, Utc::now())
    }

    #[test]
    fn test_new_order_is_pending() {
        let order = order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.limit_price, Some(dec!(1450)));
        assert_eq!(order.filled_quantity, 0);
        assert!(order.closed_at.is_none());
    }

    #[test]
    fn test_apply_fill() {
        let mut order = order();
        order
            .apply_status(&OrderStatusReport::unfilled(OrderStatus::Open))
            .unwrap();
        order
            .apply_status(&OrderStatusReport::filled(10, dec!(1449.5)))
            .unwrap();

        assert_eq!(order.status, OrderStatus::Complete);
        assert_eq!(order.filled_quantity, 10);
        assert_eq!(order.filled_value(), dec!(14495));
        assert!(order.is_terminal());
    }

    #[test]
    fn test_terminal_order_rejects_further_updates() {
        let mut order = order();
        order
            .apply_status(&OrderStatusReport::rejected("RMS: blocked"))
            .unwrap();

        let err = order
            .apply_status(&OrderStatusReport::filled(10, dec!(1450)))
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::IllegalTransition {
                from: OrderStatus::Rejected,
                to: OrderStatus::Complete,
                ..
            }
        ));
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(order.status_message.as_deref(), Some("RMS: blocked"));
    }
}
