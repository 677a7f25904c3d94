//! Tracing subscriber setup.
//!
//! The level filter sits behind a reload layer so a config reload can change
//! verbosity without restarting. `RUST_LOG` always takes precedence.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::{LogFormat, LoggingConfig};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

fn rust_log_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

fn base_filter(level: &str) -> EnvFilter {
    if rust_log_set() {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
    }
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber at `info`. Later calls are no-ops.
pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    init_tracing_with(&LoggingConfig {
        level: level.to_string(),
        ..LoggingConfig::default()
    });
}

/// Install the global subscriber described by `cfg`.
pub fn init_tracing_with(cfg: &LoggingConfig) {
    let (filter, handle) = reload::Layer::new(base_filter(&cfg.level));
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match cfg.format {
        LogFormat::Full => registry
            .with(fmt::layer().with_target(cfg.with_target))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(cfg.with_target))
            .try_init(),
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Swap the active level filter. Ignored while `RUST_LOG` is set or before
/// a subscriber has been installed. Returns whether the filter changed.
pub fn apply_logging_level(level: &str) -> bool {
    if rust_log_set() {
        return false;
    }
    let Some(handle) = LOG_RELOAD_HANDLE.get() else {
        return false;
    };
    let Ok(filter) = EnvFilter::try_new(level) else {
        tracing::warn!(level, "Ignoring unparsable log level");
        return false;
    };
    match handle.modify(|f| *f = filter) {
        Ok(()) => {
            tracing::info!(level, "Log level applied");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to apply log level");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparsable_level_falls_back() {
        // does not panic on garbage directives
        let _ = base_filter("not a [level");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_tracing_with(&LoggingConfig {
            format: LogFormat::Compact,
            ..LoggingConfig::default()
        });
        init_tracing();
    }
}
