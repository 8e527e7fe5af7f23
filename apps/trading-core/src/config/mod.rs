//! Configuration module for the trading core.
//!
//! Loads YAML configuration with environment variable interpolation and
//! validates it before any component is constructed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use trading_core::config::{Config, load_config};
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! println!("rate: {}", config.gateway.requests_per_second);
//! ```

mod capital;
mod discipline;
mod gateway;
mod health;
mod observability;
mod orders;
mod reconciliation;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use capital::CapitalConfig;
pub use discipline::DisciplineConfig;
pub use gateway::{GatewayConfig, RetrySettings};
pub use health::HealthConfig;
pub use observability::{LoggingConfig, MetricsConfig, ObservabilityConfig};
pub use orders::OrdersConfig;
pub use reconciliation::ReconciliationConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Broker gateway configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Order lifecycle configuration.
    #[serde(default)]
    pub orders: OrdersConfig,
    /// Position reconciliation configuration.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Capital ledger configuration.
    #[serde(default)]
    pub capital: CapitalConfig,
    /// Discipline gate configuration.
    #[serde(default)]
    pub discipline: DisciplineConfig,
    /// Broker health monitor configuration.
    #[serde(default)]
    pub health: HealthConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<Option<regex::Regex>> = OnceLock::new();

    let Some(re) = ENV_VAR_REGEX
        .get_or_init(|| regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").ok())
    else {
        return input.to_string();
    };

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        let default_value = cap.get(2).map(|m| m.as_str());

        match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Seconds to a duration. Negative and NaN give zero; values too large for a
/// `Duration` (including infinity) saturate at `Duration::MAX`.
pub(crate) fn secs_to_duration(secs: f64) -> std::time::Duration {
    std::time::Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(std::time::Duration::MAX)
}

fn ensure(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(message.to_string()))
    }
}

fn is_fraction(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let gateway = &config.gateway;
    ensure(
        gateway.requests_per_second.is_finite() && gateway.requests_per_second > 0.0,
        "gateway.requests_per_second must be positive",
    )?;
    ensure(
        gateway.burst_size.is_none_or(|b| b >= 1),
        "gateway.burst_size must be at least 1",
    )?;
    ensure(
        gateway.acquire_timeout.is_finite() && gateway.acquire_timeout >= 0.0,
        "gateway.acquire_timeout must not be negative",
    )?;
    ensure(
        gateway.circuit_failure_threshold > 0,
        "gateway.circuit_failure_threshold must be positive",
    )?;
    ensure(
        gateway.retry.backoff_factor >= 1.0,
        "gateway.retry.backoff_factor must be at least 1.0",
    )?;
    ensure(
        (0.0..=1.0).contains(&gateway.retry.jitter_factor),
        "gateway.retry.jitter_factor must be between 0.0 and 1.0",
    )?;

    let orders = &config.orders;
    ensure(
        orders.order_timeout.is_finite() && orders.order_timeout > 0.0,
        "orders.order_timeout must be positive",
    )?;
    ensure(
        orders.poll_interval.is_finite() && orders.poll_interval > 0.0,
        "orders.poll_interval must be positive",
    )?;
    ensure(
        orders.max_poll_attempts > 0,
        "orders.max_poll_attempts must be positive",
    )?;

    let reconciliation = &config.reconciliation;
    ensure(
        is_fraction(reconciliation.reconciliation_tolerance),
        "reconciliation.reconciliation_tolerance must be between 0 and 1",
    )?;
    ensure(
        reconciliation.interval_secs > 0,
        "reconciliation.interval_secs must be positive",
    )?;

    let capital = &config.capital;
    ensure(
        capital.max_initial_capital > Decimal::ZERO,
        "capital.max_initial_capital must be positive",
    )?;
    ensure(
        is_fraction(capital.max_daily_loss_pct),
        "capital.max_daily_loss_pct must be between 0 and 1",
    )?;

    let discipline = &config.discipline;
    ensure(
        discipline.max_daily_trades > 0,
        "discipline.max_daily_trades must be positive",
    )?;
    ensure(
        discipline.max_consecutive_losses > 0,
        "discipline.max_consecutive_losses must be positive",
    )?;
    ensure(
        is_fraction(discipline.max_drawdown_pct),
        "discipline.max_drawdown_pct must be between 0 and 1",
    )?;

    let health = &config.health;
    ensure(
        health.check_interval > 0,
        "health.check_interval must be positive",
    )?;
    ensure(
        health.failure_threshold > 0,
        "health.failure_threshold must be positive",
    )?;
    ensure(
        health.backoff_multiplier >= 1.0,
        "health.backoff_multiplier must be at least 1.0",
    )?;

    let valid_formats = ["json", "pretty"];
    if !valid_formats.contains(&config.observability.logging.format.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "observability.logging.format must be one of: {valid_formats:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use test_case::test_case;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!((config.gateway.requests_per_second - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.gateway.burst_size, None);
        assert_eq!(config.orders.max_poll_attempts, 30);
        assert_eq!(config.reconciliation.reconciliation_tolerance, dec!(0.01));
        assert_eq!(config.capital.max_initial_capital, dec!(1000));
        assert_eq!(config.capital.max_daily_loss_pct, dec!(0.05));
        assert_eq!(config.discipline.max_daily_trades, 5);
        assert_eq!(config.health.max_backoff, 300);
        assert_eq!(config.observability.logging.format, "json");
        assert!(!config.observability.metrics.enabled);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_minimal_config() {
        let yaml = r"
gateway:
  requests_per_second: 5.0
";

        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load minimal config: {e}"),
        };
        assert!((config.gateway.requests_per_second - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.orders.history_limit, 500); // Default value
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "format: ${TRADING_CORE_TEST_NONEXISTENT_VAR:-pretty}";
        let result = interpolate_env_vars(input);

        assert_eq!(result, "format: pretty");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax
    fn test_env_var_with_default_uses_existing() {
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);

        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "ledger_path: ${TRADING_CORE_TEST_UNLIKELY_TO_EXIST}";
        let result = interpolate_env_vars(input);

        assert_eq!(result, "ledger_path: ");
    }

    #[test]
    fn test_repeated_variable_is_replaced_everywhere() {
        let input = "a: ${TRADING_CORE_TEST_MISSING:-x}, b: ${TRADING_CORE_TEST_MISSING:-x}";
        assert_eq!(interpolate_env_vars(input), "a: x, b: x");
    }

    #[test_case("gateway:\n  requests_per_second: 0.0\n", "requests_per_second" ; "zero rate")]
    #[test_case("gateway:\n  burst_size: 0\n", "burst_size" ; "zero burst")]
    #[test_case("gateway:\n  retry:\n    backoff_factor: 0.5\n", "backoff_factor" ; "shrinking backoff")]
    #[test_case("orders:\n  max_poll_attempts: 0\n", "max_poll_attempts" ; "no polls")]
    #[test_case("reconciliation:\n  reconciliation_tolerance: 1.5\n", "reconciliation_tolerance" ; "tolerance above one")]
    #[test_case("capital:\n  max_initial_capital: \"-10\"\n", "max_initial_capital" ; "negative capital")]
    #[test_case("discipline:\n  max_drawdown_pct: \"2\"\n", "max_drawdown_pct" ; "drawdown above one")]
    #[test_case("health:\n  backoff_multiplier: 0.5\n", "backoff_multiplier" ; "shrinking health backoff")]
    #[test_case("observability:\n  logging:\n    format: xml\n", "format" ; "unknown log format")]
    fn test_validation_rejects(yaml: &str, field: &str) {
        match load_config_from_string(yaml) {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains(field), "{msg}"),
            other => panic!("expected validation error for {field}, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result = load_config_from_string("gateway: [not, a, map]");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = load_config(Some("/nonexistent/trading-core/config.yaml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_full_config_parse() {
        let yaml = r#"
gateway:
  requests_per_second: 3.0
  burst_size: 6
  acquire_timeout: 5
  circuit_failure_threshold: 4
  circuit_timeout: 30
  retry:
    max_retries: 2
    initial_delay_ms: 500
    backoff_factor: 2.0
    max_delay_ms: 4000
    jitter_factor: 0.1
orders:
  order_timeout: 20
  poll_interval: 0.5
  max_poll_attempts: 40
  history_limit: 100
reconciliation:
  enabled: false
  reconciliation_tolerance: 0.02
  interval_secs: 60
  history_limit: 50
capital:
  max_initial_capital: "25000"
  max_daily_loss_pct: "0.03"
  ledger_path: /var/lib/trading/capital.json
discipline:
  max_daily_trades: 3
  max_consecutive_losses: 2
  cooldown_after_loss: 30
  reduce_size_after_wins: 2
  max_drawdown_pct: "0.04"
  fomo_prevention_window: 10
health:
  check_interval: 30
  failure_threshold: 5
  backoff_multiplier: 1.5
  max_backoff: 120
observability:
  logging:
    level: debug
    format: pretty
  metrics:
    enabled: true
    listen_addr: "127.0.0.1:9100"
"#;

        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should parse full config: {e}"),
        };

        assert_eq!(config.gateway.burst_size, Some(6));
        assert_eq!(config.gateway.acquire_timeout(), Duration::from_secs(5));
        let breaker = config.gateway.circuit_breaker_config();
        assert_eq!(breaker.failure_threshold, 4);
        assert_eq!(breaker.timeout, Duration::from_secs(30));
        let policy = config.gateway.retry.to_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(4));

        assert_eq!(config.orders.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.orders.order_timeout(), Duration::from_secs(20));

        assert!(!config.reconciliation.enabled);
        assert_eq!(config.reconciliation.reconciliation_tolerance, dec!(0.02));
        assert_eq!(config.reconciliation.interval(), Duration::from_secs(60));

        assert_eq!(config.capital.max_initial_capital, dec!(25000));
        assert_eq!(
            config.capital.ledger_path,
            std::path::PathBuf::from("/var/lib/trading/capital.json")
        );

        assert_eq!(config.discipline.cooldown(), chrono::Duration::minutes(30));
        assert_eq!(config.discipline.fomo_window(), chrono::Duration::minutes(10));

        assert_eq!(config.health.check_interval(), Duration::from_secs(30));
        assert_eq!(config.observability.logging.level, "debug");
        assert_eq!(config.observability.metrics.listen_addr, "127.0.0.1:9100");
    }

    #[test]
    fn test_unvalidated_durations_do_not_panic() {
        let orders = OrdersConfig {
            order_timeout: f64::INFINITY,
            poll_interval: f64::NAN,
            ..OrdersConfig::default()
        };
        assert_eq!(orders.order_timeout(), Duration::MAX);
        assert_eq!(orders.poll_interval(), Duration::ZERO);

        let gateway = GatewayConfig {
            acquire_timeout: -3.0,
            ..GatewayConfig::default()
        };
        assert_eq!(gateway.acquire_timeout(), Duration::ZERO);
        assert_eq!(secs_to_duration(1.5), Duration::from_millis(1500));
        assert_eq!(secs_to_duration(1e300), Duration::MAX);
    }
}
