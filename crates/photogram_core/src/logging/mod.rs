//! Logging infrastructure.
//!
//! This module provides:
//! - Per-run loggers with file + console dual output
//! - Compact mode that keeps tool output in a tail buffer
//! - Integration with the `tracing` ecosystem
//!
//! # Example
//!
//! ```no_run
//! use photogram_core::logging::{LogConfig, RunLogger};
//!
//! let logger = RunLogger::new("chair_scan", "/data/chair/logs", LogConfig::default(), None).unwrap();
//!
//! logger.stage("Extract Frames");
//! logger.command("ffmpeg -i chair.mp4 -vf fps=1 images/frame_%04d.jpg");
//! logger.success("Extracted 42 frames");
//! ```

mod run_logger;
mod types;

pub use run_logger::RunLogger;
pub use types::{ConsoleCallback, LogConfig, LogLevel, MessagePrefix};

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File the global subscriber appends to when a log directory is given.
pub const TRACE_LOG_FILE: &str = "photogram.log";

/// Initialize the global tracing subscriber.
///
/// This sets up a subscriber that:
/// - Respects RUST_LOG environment variable
/// - Falls back to the provided default level
/// - Outputs to stderr
/// - Also appends to `<log_dir>/photogram.log` when `log_dir` is given
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the whole process. Calling this twice leaves the first subscriber in place.
pub fn init_tracing(default_level: LogLevel, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let log_dir = log_dir.filter(|dir| fs::create_dir_all(dir).is_ok());
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, TRACE_LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .try_init();

    guard
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
