//! File-backed tracing for the CLI.
//!
//! Diagnostics go to ${SIGNON_HOME}/logs/signon.log so interactive
//! prompts on stdout stay clean. Filtering is controlled by SIGNON_LOG.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::paths;

/// Environment variable controlling the log filter.
pub const LOG_ENV: &str = "SIGNON_LOG";

const LOG_FILE: &str = "signon.log";

/// Initializes the global tracing subscriber writing to the log file.
///
/// The returned guard must be held for the lifetime of the process;
/// dropping it flushes and stops the background writer.
///
/// # Errors
/// Returns an error if the log directory cannot be created.
pub fn init() -> Result<WorkerGuard> {
    let dir = paths::logs_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| "signon=info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}
