/*!
 * Logging and tracing initialization
 *
 * In bridge mode stdout carries the framed channel, so human-readable logs
 * must go to stderr.
 */

use std::fs::OpenOptions;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::Settings;
use crate::error::{Result, SteadfastError};

const WORKSPACE_TARGETS: [&str; 5] = [
    "steadfast",
    "steadfast_core_lock",
    "steadfast_core_config",
    "steadfast_proto",
    "steadfast_agent",
];

/// Where human-readable log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    /// Required whenever stdout is a protocol stream
    Stderr,
}

/// `steadfast=<level>` plus the same directive for every workspace crate
pub fn filter_directives(level: Level) -> String {
    WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize structured logging based on settings
pub fn init_logging(settings: &Settings, target: LogTarget) -> Result<()> {
    let log_level = if settings.verbose {
        Level::DEBUG
    } else {
        settings.log_level.to_tracing_level()
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(log_level)))
        .map_err(|e| SteadfastError::Config(format!("Failed to create log filter: {}", e)))?;

    if let Some(ref log_path) = settings.log_file {
        init_file_logging(log_path, env_filter)
    } else {
        init_console_logging(env_filter, target)
    }
}

fn init_console_logging(env_filter: EnvFilter, target: LogTarget) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match target {
        LogTarget::Stdout => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::NONE)
                    .compact(),
            )
            .try_init(),
        LogTarget::Stderr => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_ansi(false)
                    .with_span_events(FmtSpan::NONE)
                    .compact(),
            )
            .try_init(),
    };
    result.map_err(|e| SteadfastError::Config(format!("Failed to install logger: {}", e)))
}

/// JSON lines appended to `log_path`
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| SteadfastError::Config(format!("Failed to open log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| SteadfastError::Config(format!("Failed to install logger: {}", e)))
}

/// Initialize logging for tests
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_directives(Level::DEBUG)));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_covers_workspace_crates() {
        let directives = filter_directives(Level::WARN);
        assert!(directives.starts_with("steadfast=WARN"));
        assert!(directives.contains("steadfast_proto=WARN"));
        assert!(directives.contains("steadfast_agent=WARN"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::debug!("test logger installed");
    }
}
