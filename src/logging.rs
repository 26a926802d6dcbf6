//! Structured logging for the supervisor itself.
//!
//! The proxy's own output never goes through here; it is written to the
//! [`LogSink`](crate::log_sink::LogSink).

use std::io;
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Logging format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Pretty human-readable output
    #[default]
    Pretty,
    /// JSON output for log aggregation
    Json,
    /// Compact single-line output
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Minimum level when `RUST_LOG` is not set
    pub level: Level,
    /// Include target (module path)
    pub with_target: bool,
    /// Include file name and line number
    pub with_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: Level::INFO,
            with_target: true,
            with_file: false,
        }
    }
}

impl LogConfig {
    /// JSON output, for running under a service manager.
    pub const fn json() -> Self {
        Self {
            format: LogFormat::Json,
            level: Level::INFO,
            with_target: true,
            with_file: false,
        }
    }

    #[must_use]
    pub const fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub const fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup. `RUST_LOG` takes precedence over `config.level`.
/// A second call is ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    match config.format {
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(config.with_target)
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_writer(io::stderr),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        },
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .json()
                    .with_target(config.with_target)
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_writer(io::stderr),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        },
        LogFormat::Compact => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_target(config.with_target)
                    .with_file(config.with_file)
                    .with_line_number(config.with_file)
                    .with_writer(io::stderr),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        },
    }
}
