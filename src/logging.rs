//! Tracing bootstrap for the host application.

use color_eyre::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize tracing to stderr, filtered by `SHOPSYNC_LOG` (default "info").
pub fn init() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(std::io::stderr)
    .try_init()
    .map_err(|e| color_eyre::eyre::eyre!("failed to initialize tracing: {e}"))?;
  Ok(())
}

/// Initialize tracing to a daily-rotated file under `dir`.
///
/// The returned guard must stay alive for the process lifetime or buffered
/// log lines are lost.
pub fn init_file(dir: &Path) -> Result<WorkerGuard> {
  let appender = tracing_appender::rolling::daily(dir, "shopsync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| color_eyre::eyre::eyre!("failed to initialize tracing: {e}"))?;
  Ok(guard)
}

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env("SHOPSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}
