//! Order lifecycle configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Order manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdersConfig {
    /// Seconds to wait for an order to reach a terminal state.
    #[serde(default = "default_order_timeout")]
    pub order_timeout: f64,
    /// Seconds between status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
    /// Maximum number of status polls.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    /// Orders kept in the completed and failed histories.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            order_timeout: default_order_timeout(),
            poll_interval: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            history_limit: default_history_limit(),
        }
    }
}

impl OrdersConfig {
    /// Order timeout as a duration.
    #[must_use]
    pub fn order_timeout(&self) -> Duration {
        super::secs_to_duration(self.order_timeout)
    }

    /// Poll interval as a duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        super::secs_to_duration(self.poll_interval)
    }
}

const fn default_order_timeout() -> f64 {
    30.0
}

const fn default_poll_interval() -> f64 {
    1.0
}

const fn default_max_poll_attempts() -> u32 {
    30
}

const fn default_history_limit() -> usize {
    500
}
