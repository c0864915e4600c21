//! Logging infrastructure for the `bfx` front end and the benchmark tool.
//!
//! The library itself only emits `tracing` events; installing a subscriber is left to
//! binaries. [`init_logging`] installs one of two outputs:
//! - console: compact lines on stderr
//! - file: `<directory>/bfx.log` through a non-blocking writer, cleared on start
//!
//! `RUST_LOG` overrides the configured level.

use std::fs;
use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogOutput, LoggingConfig};
use crate::error::{ExtractError, ExtractResult};

/// Log file name inside [`LoggingConfig::directory`].
pub const LOG_FILE: &str = "bfx.log";

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping it flushes and closes the file writer. Console logging holds nothing.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Build the filter: `RUST_LOG` when set and valid, the configured level otherwise.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global subscriber.
///
/// # Errors
///
/// Fails if the log directory cannot be created, the log file cannot be cleared, or a
/// global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> ExtractResult<LoggingGuard> {
    let filter = build_filter(&config.level);

    match config.output {
        LogOutput::Console => {
            let console_layer = tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .compact();

            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .try_init()
                .map_err(|e| ExtractError::external("tracing-subscriber", e))?;

            Ok(LoggingGuard { _file_guard: None })
        }
        LogOutput::File => {
            fs::create_dir_all(&config.directory)
                .map_err(|e| ExtractError::io_at("create log directory", &config.directory, e))?;

            let log_path = config.directory.join(LOG_FILE);
            fs::write(&log_path, "")
                .map_err(|e| ExtractError::io_at("clear log file", &log_path, e))?;

            let file_appender = tracing_appender::rolling::never(&config.directory, LOG_FILE);
            let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .try_init()
                .map_err(|e| ExtractError::external("tracing-subscriber", e))?;

            Ok(LoggingGuard {
                _file_guard: Some(file_guard),
            })
        }
    }
}
