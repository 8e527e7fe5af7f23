//! Token bucket rate limiter.
//!
//! Holds up to `capacity` permits, refilled continuously at `rate` permits
//! per second. Refill is computed lazily on every call from the time elapsed
//! since the previous one, so there is no background task.
//!
//! All mutable state lives behind a single mutex. The lock is never held
//! across a sleep: [`TokenBucket::acquire`] computes how long the deficit
//! takes to refill, releases the lock, sleeps, and tries again.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::secs_to_duration;

const RECENT_WINDOW: Duration = Duration::from_secs(10);

/// Point-in-time limiter statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStats {
    /// Requests granted since construction or the last reset.
    pub total_requests: u64,
    /// Requests refused (try failed or acquire timed out).
    pub rejected_requests: u64,
    /// Tokens currently available.
    pub current_tokens: f64,
    /// Bucket capacity.
    pub capacity: f64,
    /// Configured refill rate.
    pub requests_per_second: f64,
    /// Granted requests per second over the last 10 seconds.
    pub recent_rate_10s: f64,
    /// `recent_rate_10s` as a percentage of the configured rate.
    pub utilization_pct: f64,
}

#[derive(Debug)]
struct RateBudget {
    tokens: f64,
    last_refill: Instant,
    total_requests: u64,
    rejected_requests: u64,
    recent: VecDeque<Instant>,
}

impl RateBudget {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }

    fn grant(&mut self, now: Instant, n: f64) {
        self.tokens -= n;
        self.total_requests += 1;
        self.recent.push_back(now);
        self.prune(now);
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.recent.front() {
            if now.saturating_duration_since(*front) > RECENT_WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Token bucket rate limiter.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    budget: Mutex<RateBudget>,
}

impl TokenBucket {
    /// Create a bucket refilled at `requests_per_second`, holding at most
    /// `burst_size` tokens (default twice the rate). The bucket starts full.
    #[must_use]
    pub fn new(requests_per_second: f64, burst_size: Option<u32>) -> Self {
        let rate = requests_per_second.max(f64::MIN_POSITIVE);
        let capacity = burst_size.map_or(rate * 2.0, f64::from).max(1.0);
        Self {
            rate,
            capacity,
            budget: Mutex::new(RateBudget {
                tokens: capacity,
                last_refill: Instant::now(),
                total_requests: 0,
                rejected_requests: 0,
                recent: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RateBudget> {
        self.budget
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Refill rate in tokens per second.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Maximum number of tokens.
    #[must_use]
    pub const fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Take `n` tokens if they are available right now.
    pub fn try_acquire(&self, n: u32) -> bool {
        let n = f64::from(n);
        let now = Instant::now();
        let mut budget = self.lock();
        budget.refill(now, self.rate, self.capacity);
        if budget.tokens >= n {
            budget.grant(now, n);
            true
        } else {
            budget.rejected_requests += 1;
            false
        }
    }

    /// Wait until `n` tokens are available and take them.
    ///
    /// Returns `false` without taking anything if `timeout` elapses first,
    /// or immediately if `n` exceeds the bucket capacity.
    pub async fn acquire(&self, n: u32, timeout: Option<Duration>) -> bool {
        let n = f64::from(n);
        if n > self.capacity {
            self.lock().rejected_requests += 1;
            tracing::warn!(
                requested = n,
                capacity = self.capacity,
                "Rate limiter request exceeds bucket capacity"
            );
            return false;
        }

        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let now = Instant::now();
            let wait = {
                let mut budget = self.lock();
                budget.refill(now, self.rate, self.capacity);
                if budget.tokens >= n {
                    budget.grant(now, n);
                    return true;
                }
                secs_to_duration((n - budget.tokens) / self.rate)
            };

            let sleep_for = match deadline {
                Some(deadline) => {
                    if now >= deadline {
                        self.lock().rejected_requests += 1;
                        tracing::debug!(requested = n, "Rate limiter acquire timed out");
                        return false;
                    }
                    wait.min(deadline - now)
                }
                None => wait,
            };

            // Float rounding can leave a sliver of a token missing.
            tokio::time::sleep(sleep_for.max(Duration::from_millis(1))).await;
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> RateLimiterStats {
        let now = Instant::now();
        let mut budget = self.lock();
        budget.refill(now, self.rate, self.capacity);
        budget.prune(now);
        let recent_rate = budget.recent.len() as f64 / RECENT_WINDOW.as_secs_f64();
        RateLimiterStats {
            total_requests: budget.total_requests,
            rejected_requests: budget.rejected_requests,
            current_tokens: budget.tokens,
            capacity: self.capacity,
            requests_per_second: self.rate,
            recent_rate_10s: recent_rate,
            utilization_pct: recent_rate / self.rate * 100.0,
        }
    }

    /// Refill to capacity and clear statistics.
    pub fn reset(&self) {
        let mut budget = self.lock();
        budget.tokens = self.capacity;
        budget.last_refill = Instant::now();
        budget.total_requests = 0;
        budget.rejected_requests = 0;
        budget.recent.clear();
        tracing::info!(capacity = self.capacity, "Rate limiter reset");
    }
}
