//! Logging setup: stderr plus a log file in the data directory.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE: &str = "articlesync.log";

fn env_filter(default: &str) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize logging to stderr and `<log_dir>/articlesync.log`.
///
/// Both outputs use RUST_LOG, defaulting to "info" (or "debug" when
/// `verbose`). The returned guard flushes the file writer and must be held
/// for the program lifetime.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Option<WorkerGuard> {
  let default = if verbose { "debug" } else { "info" };

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false)
    .with_filter(env_filter(default));

  let dir = log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok());
  match dir {
    Some(dir) => {
      let file_appender = tracing_appender::rolling::never(dir, LOG_FILE);
      let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

      tracing_subscriber::registry()
        .with(stderr_layer)
        .with(
          tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_filter(env_filter(default)),
        )
        .init();

      Some(guard)
    }
    None => {
      tracing_subscriber::registry().with(stderr_layer).init();
      None
    }
  }
}
