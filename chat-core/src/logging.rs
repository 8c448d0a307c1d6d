//! Structured logging setup using the `tracing` ecosystem.
//!
//! Console output always goes to stderr. When a log directory is given, a
//! daily rolling file is written alongside it, in plain text or JSON.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{ChatError, ChatResult};

/// Base name of the rolling log file.
pub const LOG_FILE_NAME: &str = "chathub.log";

/// Keeps the non-blocking file writer alive.
///
/// Dropping it flushes pending lines. Holds nothing for console-only logging.
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `level` accepts a bare level ("info") or full filter directives
/// ("chat_hub=trace,info"); anything unparsable falls back to "info".
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: &str, log_dir: Option<&Path>, json_output: bool) -> ChatResult<LogGuard> {
    let (file_layer, worker) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let (writer, worker) = tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_NAME));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            let layer = if json_output {
                layer.json().with_thread_ids(true).boxed()
            } else {
                layer.boxed()
            };
            (Some(layer), Some(worker))
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(filter(level))
        .try_init()
        .map_err(|e| ChatError::Internal(format!("logging already initialized: {e}")))?;

    match log_dir {
        Some(dir) => tracing::debug!("logging at {level} to {}", dir.join(LOG_FILE_NAME).display()),
        None => tracing::debug!("logging at {level} to stderr"),
    }
    Ok(LogGuard { _worker: worker })
}

/// Console-only logging for tests and short-lived commands. Later calls are ignored.
pub fn init_console_logging(level: &str) {
    let _ = init_logging(level, None, false);
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_logging_is_idempotent() {
        init_console_logging("debug");
        init_console_logging("info");
        assert!(init_logging("info", None, false).is_err());
    }
}
