//! Logging initialization using the `tracing` ecosystem.
//!
//! Provides:
//! - Console output (colored, human-readable)
//! - File output (daily rotation via `tracing-appender`)
//! - Level from `RUST_LOG`, an explicit parameter, or the configured
//!   [`LoggerSeverity`]

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggerSeverity;

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start.
///
/// # Parameters
///
/// - `log_level`: default level if `RUST_LOG` env var is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `module_name`: used as the log file prefix (e.g. `"omm-runner"`)
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(true);

    if let Some(dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, module_name);
        let file_layer = fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
    }
}

/// Pick the effective level: an explicit CLI level wins over the configured
/// severity, which wins over `"info"`.
pub fn effective_level(cli_level: Option<&str>, severity: Option<LoggerSeverity>) -> String {
    match (cli_level, severity) {
        (Some(level), _) => level.to_string(),
        (None, Some(sev)) => sev.as_filter().to_string(),
        (None, None) => "info".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_wins() {
        assert_eq!(effective_level(Some("trace"), Some(LoggerSeverity::Error)), "trace");
        assert_eq!(effective_level(None, Some(LoggerSeverity::Warning)), "warn");
        assert_eq!(effective_level(None, None), "info");
    }
}
