//! Broker health monitor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Broker health monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Seconds between probes while healthy.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    /// Consecutive failures before trading should halt.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Backoff multiplier applied after each failure.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Backoff ceiling in seconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            failure_threshold: default_failure_threshold(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl HealthConfig {
    /// Probe interval while healthy.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    /// Backoff ceiling.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff)
    }
}

const fn default_check_interval() -> u64 {
    60
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_max_backoff() -> u64 {
    300
}
