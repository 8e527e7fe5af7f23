//! Order lifecycle management.
//!
//! [`OrderManager::place_and_verify`] submits an order through the gateway,
//! then polls its status until it fills, is rejected, or runs out of time.
//! Timed-out orders get one best-effort cancel.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerAdapter, OrderRequest, OrderStatusReport};
use crate::config::OrdersConfig;
use crate::error::ExecutionError;
use crate::gateway::BrokerGateway;
use crate::observability::metrics;

use super::{Order, OrderStatus};

/// Result of a filled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderOutcome {
    /// Broker order id.
    pub order_id: String,
    /// Trading symbol.
    pub symbol: String,
    /// Final status (always `Complete`).
    pub status: OrderStatus,
    /// Filled quantity from the final poll.
    pub filled_quantity: u32,
    /// Average fill price from the final poll.
    pub average_price: Decimal,
    /// Time from submission to fill.
    pub elapsed: Duration,
    /// Status polls made.
    pub attempts: u32,
}

/// An order that did not fill, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedOrder {
    /// The order as last seen.
    pub order: Order,
    /// Why it failed.
    pub reason: String,
}

/// Aggregate order statistics since the manager was created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStats {
    /// Orders that reached an outcome.
    pub total: u64,
    /// Orders that filled.
    pub successful: u64,
    /// Orders rejected, cancelled or timed out.
    pub failed: u64,
    /// `successful / total` as a percentage (0 when nothing ran).
    pub success_rate_pct: f64,
    /// Orders currently being polled.
    pub active: usize,
}

#[derive(Debug, Default)]
struct OrderBook {
    history: VecDeque<Order>,
    failed: VecDeque<FailedOrder>,
    successful_count: u64,
    failed_count: u64,
}

enum PollResult {
    Filled(OrderStatusReport),
    Failed(OrderStatusReport),
    TimedOut,
}

/// Removes the order from the active map on every exit path.
struct ActiveOrderGuard<'a> {
    active: &'a Mutex<HashMap<String, Order>>,
    order_id: String,
    broker: &'static str,
}

impl<'a> ActiveOrderGuard<'a> {
    fn register(
        active: &'a Mutex<HashMap<String, Order>>,
        order: Order,
        broker: &'static str,
    ) -> Self {
        let order_id = order.order_id.clone();
        let count = {
            let mut map = lock(active);
            map.insert(order_id.clone(), order);
            map.len()
        };
        metrics::update_active_orders(broker, count);
        Self {
            active,
            order_id,
            broker,
        }
    }

    fn update(&self, report: &OrderStatusReport) -> Result<(), ExecutionError> {
        lock(self.active)
            .get_mut(&self.order_id)
            .map_or(Ok(()), |order| order.apply_status(report))
    }

    /// Take the order out of the active map.
    fn finish(self) -> Option<Order> {
        lock(self.active).remove(&self.order_id)
    }
}

impl Drop for ActiveOrderGuard<'_> {
    fn drop(&mut self) {
        let count = {
            let mut map = lock(self.active);
            map.remove(&self.order_id);
            map.len()
        };
        metrics::update_active_orders(self.broker, count);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Manages order lifecycle from placement to completion.
pub struct OrderManager<B: BrokerAdapter> {
    gateway: Arc<BrokerGateway<B>>,
    config: OrdersConfig,
    active: Mutex<HashMap<String, Order>>,
    book: Mutex<OrderBook>,
}

impl<B: BrokerAdapter> OrderManager<B> {
    /// Create an order manager over a shared gateway.
    pub fn new(gateway: Arc<BrokerGateway<B>>, config: OrdersConfig) -> Self {
        Self {
            gateway,
            config,
            active: Mutex::new(HashMap::new()),
            book: Mutex::new(OrderBook::default()),
        }
    }

    /// Place an order and wait for it to fill.
    ///
    /// # Errors
    ///
    /// - [`ExecutionError::InvalidOrder`] if the request is malformed
    /// - [`ExecutionError::Gateway`] if submission fails
    /// - [`ExecutionError::Order`] if the broker returns an empty order id
    /// - [`ExecutionError::OrderRejected`] if the order is rejected or cancelled
    /// - [`ExecutionError::OrderTimeout`] if it does not reach a terminal state
    ///   in time (a cancel is attempted first)
    pub async fn place_and_verify(
        &self,
        request: OrderRequest,
    ) -> Result<OrderOutcome, ExecutionError> {
        request
            .validate()
            .map_err(|reason| ExecutionError::InvalidOrder {
                symbol: request.symbol.clone(),
                reason,
            })?;

        let broker = self.gateway.broker_name();
        info!(
            broker,
            symbol = %request.symbol,
            side = %request.side,
            quantity = request.quantity,
            kind = %request.kind,
            product = %request.product,
            limit_price = ?request.limit_price,
            "Placing order"
        );

        let order_id = self
            .gateway
            .submit_order(&request)
            .await
            .map_err(|source| {
                error!(symbol = %request.symbol, error = %source, "Order submission failed");
                ExecutionError::Gateway {
                    symbol: request.symbol.clone(),
                    source,
                }
            })?;

        if order_id.trim().is_empty() {
            return Err(ExecutionError::Order(format!(
                "Broker returned no order id for {}",
                request.symbol
            )));
        }

        metrics::record_order_submission(broker, &request.kind.to_string().to_lowercase());

        let started = Instant::now();
        let guard = ActiveOrderGuard::register(
            &self.active,
            Order::new(order_id.clone(), &request, Utc::now()),
            broker,
        );

        let (result, attempts) = self.wait_for_completion(&guard, started).await;
        let elapsed = started.elapsed();

        let mut order = guard
            .finish()
            .unwrap_or_else(|| Order::new(order_id.clone(), &request, Utc::now()));
        order.closed_at = Some(Utc::now());

        match result {
            PollResult::Filled(report) => {
                info!(
                    order_id = %order_id,
                    symbol = %request.symbol,
                    filled_quantity = report.filled_quantity,
                    average_price = %report.average_price,
                    elapsed_ms = elapsed.as_millis(),
                    "Order completed"
                );
                metrics::record_order_outcome(broker, "complete", elapsed.as_secs_f64());
                self.record_success(order);

                Ok(OrderOutcome {
                    order_id,
                    symbol: request.symbol,
                    status: OrderStatus::Complete,
                    filled_quantity: report.filled_quantity,
                    average_price: report.average_price,
                    elapsed,
                    attempts,
                })
            }
            PollResult::Failed(report) => {
                let reason = report
                    .status_message
                    .clone()
                    .unwrap_or_else(|| "Unknown reason".to_string());
                error!(
                    order_id = %order_id,
                    symbol = %request.symbol,
                    status = %report.status,
                    reason = %reason,
                    "Order did not fill"
                );
                metrics::record_order_outcome(
                    broker,
                    &report.status.as_str().to_lowercase(),
                    elapsed.as_secs_f64(),
                );
                self.record_failure(order, reason.clone());

                Err(ExecutionError::OrderRejected {
                    order_id,
                    symbol: request.symbol,
                    status: report.status,
                    reason,
                })
            }
            PollResult::TimedOut => {
                error!(
                    order_id = %order_id,
                    symbol = %request.symbol,
                    attempts,
                    elapsed_ms = elapsed.as_millis(),
                    "Order timed out, attempting to cancel"
                );
                self.cancel_best_effort(&order_id).await;
                metrics::record_order_outcome(broker, "timeout", elapsed.as_secs_f64());
                self.record_failure(
                    order,
                    format!("timed out after {attempts} polls ({elapsed:?})"),
                );

                Err(ExecutionError::OrderTimeout {
                    order_id,
                    symbol: request.symbol,
                    elapsed,
                    attempts,
                })
            }
        }
    }

    /// Poll until a terminal status, the poll budget or the timeout.
    async fn wait_for_completion(
        &self,
        guard: &ActiveOrderGuard<'_>,
        started: Instant,
    ) -> (PollResult, u32) {
        let order_id = guard.order_id.as_str();
        let timeout = self.config.order_timeout();
        let poll_interval = self.config.poll_interval();
        let mut attempts = 0;

        while attempts < self.config.max_poll_attempts {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }

            attempts += 1;
            let Ok(polled) =
                tokio::time::timeout(remaining, self.gateway.get_order_status(order_id)).await
            else {
                warn!(order_id, attempts, "Order status poll ran past the order timeout");
                break;
            };

            match polled {
                Ok(report) => {
                    if let Err(e) = guard.update(&report) {
                        warn!(order_id, error = %e, "Ignoring out-of-order status update");
                    } else if report.status == OrderStatus::Complete {
                        return (PollResult::Filled(report), attempts);
                    } else if report.status.is_failure() {
                        return (PollResult::Failed(report), attempts);
                    } else {
                        debug!(order_id, status = %report.status, attempts, "Order still working");
                    }
                }
                Err(e) => {
                    warn!(order_id, attempts, error = %e, "Order status poll failed");
                }
            }

            if attempts < self.config.max_poll_attempts {
                let remaining = timeout.saturating_sub(started.elapsed());
                tokio::time::sleep(poll_interval.min(remaining)).await;
            }
        }

        (PollResult::TimedOut, attempts)
    }

    async fn cancel_best_effort(&self, order_id: &str) {
        match self.gateway.cancel_order(order_id).await {
            Ok(()) => info!(order_id, "Order cancelled after timeout"),
            Err(e) => error!(order_id, error = %e, "Failed to cancel timed out order"),
        }
    }

    fn trim<T>(list: &mut VecDeque<T>, limit: usize) {
        while list.len() > limit {
            list.pop_front();
        }
    }

    fn record_success(&self, order: Order) {
        let mut book = lock(&self.book);
        book.successful_count += 1;
        book.history.push_back(order);
        Self::trim(&mut book.history, self.config.history_limit);
    }

    fn record_failure(&self, order: Order, reason: String) {
        let mut book = lock(&self.book);
        book.failed_count += 1;
        book.failed.push_back(FailedOrder { order, reason });
        Self::trim(&mut book.failed, self.config.history_limit);
    }

    /// Orders currently being polled.
    pub fn active_orders(&self) -> Vec<Order> {
        lock(&self.active).values().cloned().collect()
    }

    /// The most recent filled orders, oldest first.
    pub fn order_history(&self, limit: usize) -> Vec<Order> {
        let book = lock(&self.book);
        let skip = book.history.len().saturating_sub(limit);
        book.history.iter().skip(skip).cloned().collect()
    }

    /// Orders that were rejected, cancelled or timed out, oldest first.
    pub fn failed_orders(&self) -> Vec<FailedOrder> {
        lock(&self.book).failed.iter().cloned().collect()
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> OrderStats {
        let (successful, failed) = {
            let book = lock(&self.book);
            (book.successful_count, book.failed_count)
        };
        let total = successful + failed;
        let success_rate_pct = if total == 0 {
            0.0
        } else {
            ((successful as f64 / total as f64) * 10_000.0).round() / 100.0
        };

        OrderStats {
            total,
            successful,
            failed,
            success_rate_pct,
            active: lock(&self.active).len(),
        }
    }

    /// The shared gateway.
    pub const fn gateway(&self) -> &Arc<BrokerGateway<B>> {
        &self.gateway
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::broker::{BrokerError, OrderSide, ScriptedBroker};
    use crate::gateway::GatewayError;
    use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy, TokenBucket};

    fn make_manager(broker: &Arc<ScriptedBroker>, config: OrdersConfig) -> OrderManager<ScriptedBroker> {
        make_manager_with_retry(broker, config, RetryPolicy::no_retry())
    }

    fn make_manager_with_retry(
        broker: &Arc<ScriptedBroker>,
        config: OrdersConfig,
        retry: RetryPolicy,
    ) -> OrderManager<ScriptedBroker> {
        let gateway = BrokerGateway::new(
            Arc::clone(broker),
            TokenBucket::new(100.0, Some(100)),
            retry,
            CircuitBreaker::new("scripted", CircuitBreakerConfig::default()),
            Duration::from_secs(1),
        );
        OrderManager::new(Arc::new(gateway), config)
    }

    fn config() -> OrdersConfig {
        OrdersConfig {
            order_timeout: 30.0,
            poll_interval: 1.0,
            max_poll_attempts: 30,
            history_limit: 10,
        }
    }

    fn buy() -> OrderRequest {
        OrderRequest::limit("RELIANCE", OrderSide::Buy, 10, dec!(1450))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_after_open_polls() {
        let broker = Arc::new(ScriptedBroker::new());
        broker.push_statuses([
            OrderStatusReport::unfilled(OrderStatus::Open),
            OrderStatusReport::unfilled(OrderStatus::Open),
            OrderStatusReport::filled(10, dec!(1449.75)),
        ]);
        let manager = make_manager(&broker, config());

        let outcome = manager.place_and_verify(buy()).await.unwrap();

        assert_eq!(outcome.order_id, "order-1");
        assert_eq!(outcome.status, OrderStatus::Complete);
        assert_eq!(outcome.filled_quantity, 10);
        assert_eq!(outcome.average_price, dec!(1449.75));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.elapsed, Duration::from_secs(2));
        assert_eq!(broker.cancel_calls(), 0);

        let history = manager.order_history(50);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, OrderStatus::Complete);
        assert!(history[0].closed_at.is_some());
        assert!(manager.active_orders().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_terminal_times_out_and_cancels_once() {
        let broker = Arc::new(ScriptedBroker::new());
        let manager = make_manager(
            &broker,
            OrdersConfig {
                order_timeout: 5.0,
                ..config()
            },
        );

        let err = manager.place_and_verify(buy()).await.unwrap_err();

        match err {
            ExecutionError::OrderTimeout {
                order_id,
                symbol,
                attempts,
                ..
            } => {
                assert_eq!(order_id, "order-1");
                assert_eq!(symbol, "RELIANCE");
                assert_eq!(attempts, 5);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(broker.cancel_calls(), 1);
        assert_eq!(broker.cancelled_orders(), vec!["order-1".to_string()]);
        assert_eq!(manager.failed_orders().len(), 1);
        assert!(manager.active_orders().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_poll_is_cut_off_at_order_timeout() {
        let broker = Arc::new(ScriptedBroker::new());
        for _ in 0..10 {
            broker.push_status(Err(BrokerError::Timeout("read timed out".into())));
        }
        let manager = make_manager_with_retry(
            &broker,
            OrdersConfig {
                order_timeout: 2.0,
                ..config()
            },
            RetryPolicy::default(),
        );

        let err = manager.place_and_verify(buy()).await.unwrap_err();

        match err {
            ExecutionError::OrderTimeout {
                elapsed, attempts, ..
            } => {
                assert!(elapsed >= Duration::from_secs(2));
                assert!(elapsed <= Duration::from_secs(3), "elapsed {elapsed:?}");
                assert_eq!(attempts, 1);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(broker.cancel_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_budget_exhausted_before_timeout() {
        let broker = Arc::new(ScriptedBroker::new());
        let manager = make_manager(
            &broker,
            OrdersConfig {
                max_poll_attempts: 3,
                ..config()
            },
        );

        let err = manager.place_and_verify(buy()).await.unwrap_err();

        assert!(matches!(err, ExecutionError::OrderTimeout { attempts: 3, .. }));
        assert_eq!(broker.status_calls(), 3);
        assert_eq!(broker.cancel_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_failure_is_not_raised() {
        let broker = Arc::new(ScriptedBroker::new());
        broker.push_cancel(Err(BrokerError::Connection("reset".into())));
        let manager = make_manager(
            &broker,
            OrdersConfig {
                max_poll_attempts: 2,
                ..config()
            },
        );

        let err = manager.place_and_verify(buy()).await.unwrap_err();

        assert!(matches!(err, ExecutionError::OrderTimeout { .. }));
        assert_eq!(broker.cancel_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_carries_reason() {
        let broker = Arc::new(ScriptedBroker::new());
        broker.push_statuses([
            OrderStatusReport::unfilled(OrderStatus::Open),
            OrderStatusReport::rejected("RMS: insufficient margin"),
        ]);
        let manager = make_manager(&broker, config());

        let err = manager.place_and_verify(buy()).await.unwrap_err();

        match err {
            ExecutionError::OrderRejected { status, reason, .. } => {
                assert_eq!(status, OrderStatus::Rejected);
                assert_eq!(reason, "RMS: insufficient margin");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(broker.cancel_calls(), 0);
        let failed = manager.failed_orders();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].order.status, OrderStatus::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_and_unknown_statuses_count_as_attempts() {
        let broker = Arc::new(ScriptedBroker::new());
        broker.push_status(Err(BrokerError::Timeout("slow".into())));
        broker.push_status(Err(BrokerError::UnrecognizedStatus("AMO REQ RECEIVED".into())));
        broker.push_status(Ok(OrderStatusReport::filled(10, dec!(1450))));
        let manager = make_manager(&broker, config());

        let outcome = manager.place_and_verify(buy()).await.unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(broker.status_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_never_reaches_broker() {
        let broker = Arc::new(ScriptedBroker::new());
        let manager = make_manager(&broker, config());

        let request = OrderRequest::market("RELIANCE", OrderSide::Buy, 0);
        let err = manager.place_and_verify(request).await.unwrap_err();

        assert!(matches!(err, ExecutionError::InvalidOrder { .. }));
        assert_eq!(broker.submit_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_carries_symbol() {
        let broker = Arc::new(ScriptedBroker::new());
        broker.push_submit(Err(BrokerError::InsufficientFunds("margin".into())));
        let manager = make_manager(&broker, config());

        let err = manager.place_and_verify(buy()).await.unwrap_err();

        match err {
            ExecutionError::Gateway { symbol, source } => {
                assert_eq!(symbol, "RELIANCE");
                assert!(matches!(source, GatewayError::Permanent { .. }));
            }
            other => panic!("expected gateway error, got {other:?}"),
        }
        assert_eq!(broker.status_calls(), 0);
        assert_eq!(manager.stats().total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_order_id_is_order_error() {
        let broker = Arc::new(ScriptedBroker::new());
        broker.push_submit(Ok(String::new()));
        let manager = make_manager(&broker, config());

        let err = manager.place_and_verify(buy()).await.unwrap_err();

        assert!(matches!(err, ExecutionError::Order(_)));
        assert_eq!(broker.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_is_active_while_polling() {
        let broker = Arc::new(ScriptedBroker::new());
        broker.push_statuses([
            OrderStatusReport::unfilled(OrderStatus::Open),
            OrderStatusReport::unfilled(OrderStatus::Open),
            OrderStatusReport::filled(10, dec!(1450)),
        ]);
        let manager = Arc::new(make_manager(&broker, config()));

        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.place_and_verify(buy()).await })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        let active = manager.active_orders();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, OrderStatus::Open);
        assert_eq!(manager.stats().active, 1);

        task.await.unwrap().unwrap();
        assert!(manager.active_orders().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_bounded_history() {
        let broker = Arc::new(ScriptedBroker::new());
        let manager = make_manager(
            &broker,
            OrdersConfig {
                history_limit: 2,
                ..config()
            },
        );

        for _ in 0..3 {
            broker.push_statuses([OrderStatusReport::filled(10, dec!(1450))]);
            manager.place_and_verify(buy()).await.unwrap();
        }
        broker.push_statuses([OrderStatusReport::rejected("blocked")]);
        let _ = manager.place_and_verify(buy()).await;

        let stats = manager.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.successful, 3);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate_pct - 75.0).abs() < f64::EPSILON);

        let history = manager.order_history(50);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].order_id, "order-3");
        assert_eq!(manager.order_history(1).len(), 1);
    }
}
