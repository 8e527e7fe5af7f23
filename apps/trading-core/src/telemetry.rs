//! Structured logging setup.
//!
//! Installs a `tracing_subscriber::fmt` subscriber in JSON or pretty format.
//! `RUST_LOG` overrides the configured level.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Build the level filter: `RUST_LOG` when set, otherwise the configured level.
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Initialize the global tracing subscriber.
///
/// Returns `false` when a subscriber was already installed (e.g. by a test
/// harness or an earlier call); the existing subscriber is kept.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(true);

    let installed = if config.format == "pretty" {
        builder.pretty().try_init().is_ok()
    } else {
        builder.json().with_current_span(true).try_init().is_ok()
    };

    if installed {
        tracing::info!(
            level = %config.level,
            format = %config.format,
            "Tracing initialized"
        );
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_falls_back() {
        let config = LoggingConfig {
            level: "not a [valid] directive".to_string(),
            format: "json".to_string(),
        };
        // Must not panic regardless of RUST_LOG
        let _filter = env_filter(&config);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let config = LoggingConfig::default();
        let _first = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
