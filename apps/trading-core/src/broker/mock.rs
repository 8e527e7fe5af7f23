//! Scripted broker adapter for testing.
//!
//! Returns queued responses in order; once a queue is drained it falls back
//! to a configurable default. Call counters make it possible to assert how
//! often the resilience layers actually reached the broker.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::orders::OrderStatus;

use super::{BrokerAdapter, BrokerError, BrokerPosition, OrderRequest, OrderStatusReport};

#[derive(Debug)]
struct Script {
    submits: VecDeque<Result<String, BrokerError>>,
    statuses: VecDeque<Result<OrderStatusReport, BrokerError>>,
    cancels: VecDeque<Result<(), BrokerError>>,
    positions: VecDeque<Result<Vec<BrokerPosition>, BrokerError>>,
    health: VecDeque<Result<(), BrokerError>>,
    default_status: OrderStatusReport,
    default_positions: Vec<BrokerPosition>,
    submitted: Vec<OrderRequest>,
    cancelled: Vec<String>,
}

/// Scripted broker adapter.
///
/// Order IDs are generated sequentially starting from 1 unless a submit
/// response has been queued.
#[derive(Debug)]
pub struct ScriptedBroker {
    order_counter: AtomicU64,
    submit_calls: AtomicU64,
    status_calls: AtomicU64,
    cancel_calls: AtomicU64,
    position_calls: AtomicU64,
    health_calls: AtomicU64,
    script: Mutex<Script>,
}

impl Default for ScriptedBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBroker {
    /// Create a broker whose orders stay `Open` and that holds no positions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            order_counter: AtomicU64::new(1),
            submit_calls: AtomicU64::new(0),
            status_calls: AtomicU64::new(0),
            cancel_calls: AtomicU64::new(0),
            position_calls: AtomicU64::new(0),
            health_calls: AtomicU64::new(0),
            script: Mutex::new(Script {
                submits: VecDeque::new(),
                statuses: VecDeque::new(),
                cancels: VecDeque::new(),
                positions: VecDeque::new(),
                health: VecDeque::new(),
                default_status: OrderStatusReport::unfilled(OrderStatus::Open),
                default_positions: Vec::new(),
                submitted: Vec::new(),
                cancelled: Vec::new(),
            }),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queue the result of the next `submit_order` call.
    pub fn push_submit(&self, result: Result<String, BrokerError>) {
        self.script().submits.push_back(result);
    }

    /// Queue the result of the next `get_order_status` call.
    pub fn push_status(&self, result: Result<OrderStatusReport, BrokerError>) {
        self.script().statuses.push_back(result);
    }

    /// Queue a sequence of successful status reports.
    pub fn push_statuses(&self, reports: impl IntoIterator<Item = OrderStatusReport>) {
        let mut script = self.script();
        script.statuses.extend(reports.into_iter().map(Ok));
    }

    /// Status returned once the status queue is empty.
    pub fn set_default_status(&self, report: OrderStatusReport) {
        self.script().default_status = report;
    }

    /// Queue the result of the next `cancel_order` call.
    pub fn push_cancel(&self, result: Result<(), BrokerError>) {
        self.script().cancels.push_back(result);
    }

    /// Queue the result of the next `get_positions` call.
    pub fn push_positions(&self, result: Result<Vec<BrokerPosition>, BrokerError>) {
        self.script().positions.push_back(result);
    }

    /// Positions returned once the positions queue is empty.
    pub fn set_positions(&self, positions: Vec<BrokerPosition>) {
        self.script().default_positions = positions;
    }

    /// Queue the result of the next `health_check` call.
    pub fn push_health(&self, result: Result<(), BrokerError>) {
        self.script().health.push_back(result);
    }

    /// Number of `submit_order` calls received.
    pub fn submit_calls(&self) -> u64 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_order_status` calls received.
    pub fn status_calls(&self) -> u64 {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Number of `cancel_order` calls received.
    pub fn cancel_calls(&self) -> u64 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_positions` calls received.
    pub fn position_calls(&self) -> u64 {
        self.position_calls.load(Ordering::SeqCst)
    }

    /// Number of `health_check` calls received.
    pub fn health_calls(&self) -> u64 {
        self.health_calls.load(Ordering::SeqCst)
    }

    /// Requests that reached `submit_order`.
    pub fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.script().submitted.clone()
    }

    /// Order IDs that reached `cancel_order`.
    pub fn cancelled_orders(&self) -> Vec<String> {
        self.script().cancelled.clone()
    }
}

#[async_trait]
impl BrokerAdapter for ScriptedBroker {
    async fn submit_order(&self, request: &OrderRequest) -> Result<String, BrokerError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script();
        script.submitted.push(request.clone());
        match script.submits.pop_front() {
            Some(result) => result,
            None => {
                let id = self.order_counter.fetch_add(1, Ordering::SeqCst);
                Ok(format!("order-{id}"))
            }
        }
    }

    async fn get_order_status(&self, _order_id: &str) -> Result<OrderStatusReport, BrokerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script();
        match script.statuses.pop_front() {
            Some(result) => result,
            None => Ok(script.default_status.clone()),
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script();
        script.cancelled.push(order_id.to_string());
        script.cancels.pop_front().unwrap_or(Ok(()))
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        self.position_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script();
        match script.positions.pop_front() {
            Some(result) => result,
            None => Ok(script.default_positions.clone()),
        }
    }

    fn broker_name(&self) -> &'static str {
        "scripted"
    }

    async fn health_check(&self) -> Result<(), BrokerError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.script().health.pop_front().unwrap_or(Ok(()))
    }
}
