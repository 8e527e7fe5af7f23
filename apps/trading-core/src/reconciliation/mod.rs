//! Position reconciliation with the broker.
//!
//! Compares locally tracked positions against the broker's net positions and
//! reports drift. The reconciler never mutates the tracked ledger; deciding
//! what to do about a discrepancy is the caller's job.

mod discrepancy;
mod report;

pub use discrepancy::{Discrepancy, DiscrepancyKind, DiscrepancySeverity};
pub use report::{ReconciliationReport, ReconciliationStatus};

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerAdapter, BrokerPosition};
use crate::config::ReconciliationConfig;
use crate::gateway::BrokerGateway;
use crate::observability::metrics;

/// Recent discrepancies returned by [`PositionReconciler::stats`].
const RECENT_DISCREPANCIES: usize = 10;

/// A position as tracked by the trading system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPosition {
    /// Trading symbol.
    pub symbol: String,
    /// Signed quantity (negative for short).
    pub quantity: i64,
    /// Average entry price.
    pub average_price: Decimal,
    /// Capital committed to the position.
    pub invested_capital: Decimal,
    /// When the position was opened.
    pub entry_time: DateTime<Utc>,
}

impl TrackedPosition {
    /// Create a tracked position opened now.
    #[must_use]
    pub fn new(symbol: impl Into<String>, quantity: i64, average_price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            average_price,
            invested_capital: average_price * Decimal::from(quantity.unsigned_abs()),
            entry_time: Utc::now(),
        }
    }
}

/// Supplies the tracked positions for periodic reconciliation.
pub trait PositionSource: Send + Sync {
    /// Snapshot of the currently tracked positions, keyed by symbol.
    fn tracked_positions(&self) -> HashMap<String, TrackedPosition>;
}

impl PositionSource for Mutex<HashMap<String, TrackedPosition>> {
    fn tracked_positions(&self) -> HashMap<String, TrackedPosition> {
        self.lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Reconciliation statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationStats {
    /// Completed (non-skipped) runs.
    pub total_syncs: u64,
    /// Completion time of the last non-skipped run.
    pub last_sync: Option<DateTime<Utc>>,
    /// Discrepancies currently held in history.
    pub total_discrepancies: usize,
    /// The most recent discrepancies, oldest first.
    pub recent_discrepancies: Vec<Discrepancy>,
}

#[derive(Debug, Default)]
struct ReconcilerState {
    sync_count: u64,
    last_sync: Option<DateTime<Utc>>,
    discrepancies: VecDeque<Discrepancy>,
}

/// Reconciles tracked positions against the broker.
pub struct PositionReconciler<B: BrokerAdapter> {
    gateway: Arc<BrokerGateway<B>>,
    config: ReconciliationConfig,
    state: Mutex<ReconcilerState>,
}

impl<B: BrokerAdapter> PositionReconciler<B> {
    /// Create a reconciler over a shared gateway.
    pub fn new(gateway: Arc<BrokerGateway<B>>, config: ReconciliationConfig) -> Self {
        Self {
            gateway,
            config,
            state: Mutex::new(ReconcilerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReconcilerState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether two average prices agree within the configured tolerance.
    ///
    /// Both zero is a match; exactly one zero is not.
    fn prices_match(&self, tracked: Decimal, broker: Decimal) -> bool {
        if tracked.is_zero() || broker.is_zero() {
            return tracked == broker;
        }
        (tracked - broker).abs() / tracked.abs() <= self.config.reconciliation_tolerance
    }

    /// Reconcile tracked positions with broker positions.
    ///
    /// A failed broker fetch yields a `Skipped` report rather than an error.
    pub async fn reconcile(
        &self,
        tracked: &HashMap<String, TrackedPosition>,
    ) -> ReconciliationReport {
        let start = Instant::now();
        info!(tracked = tracked.len(), "Starting position reconciliation");

        let broker_positions = match self.gateway.get_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "Could not fetch broker positions, skipping reconciliation");
                let report = ReconciliationReport::skipped(start.elapsed());
                metrics::record_reconciliation(report.status.as_str(), report.duration.as_secs_f64());
                return report;
            }
        };

        let now = Utc::now();
        let (matched, discrepancies) = self.compare(tracked, &broker_positions, now);

        let status = if discrepancies.is_empty() {
            ReconciliationStatus::Ok
        } else {
            ReconciliationStatus::Mismatch
        };

        {
            let mut state = self.lock();
            state.sync_count += 1;
            state.last_sync = Some(now);
            state.discrepancies.extend(discrepancies.iter().cloned());
            while state.discrepancies.len() > self.config.history_limit {
                state.discrepancies.pop_front();
            }
        }

        let report = ReconciliationReport {
            status,
            matched,
            mismatched: discrepancies.len(),
            discrepancies,
            broker_positions,
            completed_at: now,
            duration: start.elapsed(),
        };

        metrics::record_reconciliation(status.as_str(), report.duration.as_secs_f64());
        if report.mismatched > 0 {
            error!(
                matched = report.matched,
                mismatched = report.mismatched,
                "Position reconciliation found discrepancies"
            );
        } else {
            info!(matched = report.matched, "Position reconciliation OK");
        }

        report
    }

    fn compare(
        &self,
        tracked: &HashMap<String, TrackedPosition>,
        broker_positions: &[BrokerPosition],
        now: DateTime<Utc>,
    ) -> (usize, Vec<Discrepancy>) {
        let broker: HashMap<&str, &BrokerPosition> = broker_positions
            .iter()
            .filter(|p| p.quantity != 0)
            .map(|p| (p.symbol.as_str(), p))
            .collect();

        let mut discrepancies = Vec::new();
        let mut matched = 0;

        // Sorted so reports are stable across runs
        let mut symbols: Vec<&String> = tracked.keys().collect();
        symbols.sort();

        for symbol in symbols {
            let position = &tracked[symbol];
            let tracked_side = (position.quantity, position.average_price);

            let Some(held) = broker.get(symbol.as_str()) else {
                error!(symbol = %symbol, quantity = position.quantity, "Position missing at broker");
                discrepancies.push(Discrepancy::new(
                    symbol.as_str(),
                    DiscrepancyKind::MissingInBroker,
                    tracked_side,
                    (0, Decimal::ZERO),
                    now,
                ));
                continue;
            };
            let broker_side = (held.quantity, held.average_price);

            let kind = if position.quantity != held.quantity {
                error!(
                    symbol = %symbol,
                    tracked = position.quantity,
                    broker = held.quantity,
                    "Quantity mismatch"
                );
                Some(DiscrepancyKind::QuantityMismatch)
            } else if !self.prices_match(position.average_price, held.average_price) {
                warn!(
                    symbol = %symbol,
                    tracked = %position.average_price,
                    broker = %held.average_price,
                    "Average price mismatch"
                );
                Some(DiscrepancyKind::PriceMismatch)
            } else {
                None
            };

            match kind {
                Some(kind) => discrepancies.push(Discrepancy::new(
                    symbol.as_str(),
                    kind,
                    tracked_side,
                    broker_side,
                    now,
                )),
                None => {
                    debug!(symbol = %symbol, "Position matched");
                    matched += 1;
                }
            }
        }

        let mut untracked: Vec<&&BrokerPosition> = broker
            .values()
            .filter(|p| !tracked.contains_key(&p.symbol))
            .collect();
        untracked.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        for held in untracked {
            error!(symbol = %held.symbol, quantity = held.quantity, "Broker position unknown to system");
            discrepancies.push(Discrepancy::new(
                held.symbol.as_str(),
                DiscrepancyKind::MissingInSystem,
                (0, Decimal::ZERO),
                (held.quantity, held.average_price),
                now,
            ));
        }

        for d in &discrepancies {
            metrics::record_discrepancy(d.kind.as_str());
        }

        (matched, discrepancies)
    }

    /// Reconciliation statistics.
    pub fn stats(&self) -> ReconciliationStats {
        let state = self.lock();
        let skip = state.discrepancies.len().saturating_sub(RECENT_DISCREPANCIES);
        ReconciliationStats {
            total_syncs: state.sync_count,
            last_sync: state.last_sync,
            total_discrepancies: state.discrepancies.len(),
            recent_discrepancies: state.discrepancies.iter().skip(skip).cloned().collect(),
        }
    }

    /// Clear discrepancy history.
    pub fn clear_discrepancies(&self) {
        self.lock().discrepancies.clear();
        info!("Discrepancy history cleared");
    }

    /// Reconcile on a fixed interval until shutdown.
    ///
    /// The first run happens one `interval` after start. Returns the number
    /// of runs made.
    pub async fn run_periodic<S: PositionSource + ?Sized>(
        &self,
        source: &S,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> u64 {
        info!(
            interval_secs = interval.as_secs(),
            "Starting periodic reconciliation"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        let mut runs = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.reconcile(&source.tracked_positions()).await;
                    runs += 1;
                    if report.status == ReconciliationStatus::Mismatch {
                        warn!(
                            mismatched = report.mismatched,
                            "Periodic reconciliation detected drift"
                        );
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(runs, "Periodic reconciliation shutting down");
                    break;
                }
            }
        }

        runs
    }

    /// Configured price tolerance.
    pub const fn tolerance(&self) -> Decimal {
        self.config.reconciliation_tolerance
    }
}
