//! Broker health monitoring.
//!
//! Probes the broker with [`BrokerAdapter::health_check`] and backs off
//! exponentially while it keeps failing, so a down broker is not hammered
//! and the trading loop can halt once failures pile up.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::HealthConfig;
use crate::observability::metrics;

use super::BrokerAdapter;

const MAX_FAILURE_HISTORY: usize = 100;

/// Result of a health check attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckOutcome {
    /// Whether the broker is considered healthy.
    pub is_healthy: bool,
    /// Consecutive failed probes.
    pub consecutive_failures: u32,
    /// Error from this probe, if one ran and failed.
    pub last_error: Option<String>,
    /// Time until the next probe will actually run.
    pub next_check_in: Duration,
    /// Failures reached the threshold; trading should stop.
    pub should_halt: bool,
    /// Whether the broker was actually probed (false inside the backoff window).
    pub probed: bool,
}

/// Snapshot of monitor state without probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    /// Whether the broker is considered healthy.
    pub is_healthy: bool,
    /// Consecutive failed probes.
    pub consecutive_failures: u32,
    /// Time of the last probe.
    pub last_check: Option<DateTime<Utc>>,
    /// Time of the last successful probe.
    pub last_success: Option<DateTime<Utc>>,
    /// Failures recorded within the last hour.
    pub recent_failures: usize,
    /// Most recent probe error.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
struct FailureRecord {
    at: DateTime<Utc>,
    error: String,
}

#[derive(Debug)]
struct HealthState {
    consecutive_failures: u32,
    last_check: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    is_healthy: bool,
    current_backoff: Duration,
    failures: VecDeque<FailureRecord>,
}

/// Monitors broker API health and detects downtime.
pub struct BrokerHealthMonitor<B: BrokerAdapter> {
    broker: Arc<B>,
    config: HealthConfig,
    state: Mutex<HealthState>,
}

impl<B: BrokerAdapter> BrokerHealthMonitor<B> {
    /// Create a new monitor.
    pub fn new(broker: Arc<B>, config: HealthConfig) -> Self {
        let interval = config.check_interval();
        Self {
            broker,
            config,
            state: Mutex::new(HealthState {
                consecutive_failures: 0,
                last_check: None,
                last_success: None,
                is_healthy: true,
                current_backoff: interval,
                failures: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HealthState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn should_halt(&self, failures: u32) -> bool {
        failures >= self.config.failure_threshold
    }

    /// Probe the broker now, honouring the backoff window.
    pub async fn check(&self) -> HealthCheckOutcome {
        self.check_at(Utc::now()).await
    }

    /// Probe the broker at `now`, honouring the backoff window.
    pub async fn check_at(&self, now: DateTime<Utc>) -> HealthCheckOutcome {
        {
            let state = self.lock();
            if let Some(last) = state.last_check {
                let since = (now - last).to_std().unwrap_or_default();
                if since < state.current_backoff {
                    return HealthCheckOutcome {
                        is_healthy: state.is_healthy,
                        consecutive_failures: state.consecutive_failures,
                        last_error: None,
                        next_check_in: state.current_backoff - since,
                        should_halt: self.should_halt(state.consecutive_failures),
                        probed: false,
                    };
                }
            }
        }

        let result = self.broker.health_check().await;
        metrics::record_health_check(self.broker.broker_name(), result.is_ok());

        let mut state = self.lock();
        state.last_check = Some(now);
        match result {
            Ok(()) => {
                state.is_healthy = true;
                state.consecutive_failures = 0;
                state.last_success = Some(now);
                state.current_backoff = self.config.check_interval();
                debug!(broker = self.broker.broker_name(), "Broker health check OK");

                HealthCheckOutcome {
                    is_healthy: true,
                    consecutive_failures: 0,
                    last_error: None,
                    next_check_in: state.current_backoff,
                    should_halt: false,
                    probed: true,
                }
            }
            Err(e) => {
                state.consecutive_failures += 1;
                let message = e.to_string();
                state.failures.push_back(FailureRecord {
                    at: now,
                    error: message.clone(),
                });
                while state.failures.len() > MAX_FAILURE_HISTORY {
                    state.failures.pop_front();
                }

                let halt = self.should_halt(state.consecutive_failures);
                if halt {
                    state.is_healthy = false;
                    error!(
                        broker = self.broker.broker_name(),
                        failures = state.consecutive_failures,
                        error = %message,
                        "Broker appears to be down, trading should halt"
                    );
                } else {
                    warn!(
                        broker = self.broker.broker_name(),
                        failures = state.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        error = %message,
                        "Broker health check failed"
                    );
                }

                let next = state
                    .current_backoff
                    .mul_f64(self.config.backoff_multiplier)
                    .min(self.config.max_backoff());
                state.current_backoff = next;

                HealthCheckOutcome {
                    is_healthy: false,
                    consecutive_failures: state.consecutive_failures,
                    last_error: Some(message),
                    next_check_in: next,
                    should_halt: halt,
                    probed: true,
                }
            }
        }
    }

    /// Current state without probing.
    pub fn status_at(&self, now: DateTime<Utc>) -> HealthStatus {
        let state = self.lock();
        let hour_ago = now - chrono::Duration::hours(1);
        HealthStatus {
            is_healthy: state.is_healthy,
            consecutive_failures: state.consecutive_failures,
            last_check: state.last_check,
            last_success: state.last_success,
            recent_failures: state.failures.iter().filter(|f| f.at > hour_ago).count(),
            last_error: state.failures.back().map(|f| f.error.clone()),
        }
    }

    /// Current state without probing.
    pub fn status(&self) -> HealthStatus {
        self.status_at(Utc::now())
    }

    /// Reset after a manual reconnection.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.consecutive_failures = 0;
        state.is_healthy = true;
        state.current_backoff = self.config.check_interval();
        info!("Broker health monitor reset");
    }
}
