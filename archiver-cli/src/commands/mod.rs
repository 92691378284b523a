//! CLI command implementations

pub mod list;
pub mod logs;
pub mod serve;
pub mod setup;
pub mod status;
pub mod sync;
pub mod venmo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use archiver_core::config::DIR_ENV;
use archiver_core::{ArchiverContext, EntryPoint, LogEvent, LoggingService};

/// Data directory: `$SFA_DIR` or `~/.simplefin-archiver`, created if missing
pub fn get_data_dir() -> Result<PathBuf> {
    let dir = match std::env::var(DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .context("Could not find home directory; set SFA_DIR")?
            .join(".simplefin-archiver"),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
    Ok(dir)
}

/// Open the archive in the data directory
pub fn get_context() -> Result<ArchiverContext> {
    let dir = get_data_dir()?;
    ArchiverContext::new(&dir).context("Failed to open the archive")
}

/// Event logger for CLI runs. `None` if it can't be opened; logging never
/// blocks a command.
pub fn get_logger() -> Option<LoggingService> {
    let dir = get_data_dir().ok()?;
    match LoggingService::new(&dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")) {
        Ok(logger) => Some(logger),
        Err(e) => {
            tracing::debug!(error = %e, "event log unavailable");
            None
        }
    }
}

pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}
