//! Logging setup for the binary.
//!
//! Logs go to stderr (stdout carries the emitted resource states) and to
//! `boundres.log` in the log directory. `RUST_LOG` overrides the level.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "boundres.log";

/// Keeps the file writer alive. Dropping it flushes the log file.
pub struct LoggingGuard {
  _file_guard: WorkerGuard,
}

/// Install the global subscriber.
pub fn init_logging(log_dir: &Path, verbose: bool) -> Result<LoggingGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
  let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

  let file_layer = tracing_subscriber::fmt::layer()
    .with_writer(file_writer)
    .with_ansi(false);

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false);

  let default_level = if verbose { "debug" } else { "info" };
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::registry()
    .with(env_filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to install logger: {}", e))?;

  Ok(LoggingGuard {
    _file_guard: file_guard,
  })
}

/// Default log directory: $XDG_DATA_HOME/boundres/logs
pub fn default_log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("boundres").join("logs"))
}
