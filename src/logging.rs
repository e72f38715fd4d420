//! # Structured Logging Module
//!
//! Environment-aware diagnostic tracing for the framework internals, written
//! to the console and to a JSON file. This is separate from the
//! [`LogRouter`](crate::log_router::LogRouter), which carries the
//! application's own event records.

use chrono::Utc;
use std::fs;
use std::path::Path;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ConfigManager;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging under `./log`
pub fn init_structured_logging() {
    init_structured_logging_in(Path::new("log"));
}

/// Initialize structured logging with the JSON file placed in `log_dir`.
///
/// Only the first call per process has an effect. A subscriber installed by
/// someone else is left in place.
pub fn init_structured_logging_in(log_dir: &Path) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(env_filter(log_level));

        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");

        let (file_layer, guard, log_path) = match fs::create_dir_all(log_dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::never(log_dir, &log_filename);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(env_filter(log_level));
                (Some(layer), Some(guard), Some(log_dir.join(&log_filename)))
            }
            Err(err) => {
                eprintln!("structured logging: cannot create {}: {err}", log_dir.display());
                (None, None, None)
            }
        };

        let installed = tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init();
        if installed.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid,
            environment = %environment,
            log_file = %log_path.map(|p| p.display().to_string()).unwrap_or_default(),
            "🔧 STRUCTURED LOGGING: Initialized"
        );

        // The writer thread lives for the rest of the process
        if let Some(guard) = guard {
            std::mem::forget(guard);
        }
    });
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn get_environment() -> String {
    ConfigManager::detect_environment()
}

/// Default filter for an environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels_by_environment() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("test"), "warn");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        init_structured_logging_in(dir.path());
        init_structured_logging_in(dir.path());
        assert!(LOGGER_INITIALIZED.get().is_some());
    }
}
