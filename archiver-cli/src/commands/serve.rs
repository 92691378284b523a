//! Serve command - HTTP API over the archive

use std::sync::Arc;

use anyhow::{Context, Result};
use archiver_core::adapters::duckdb::ArchiveHandle;
use archiver_core::config::Config;
use archiver_core::{EntryPoint, LogEvent, LoggingService};

use super::get_data_dir;
use crate::api::{app_router, AppState};
use crate::output;

pub fn run(listen: Option<String>) -> Result<()> {
    let dir = get_data_dir()?;
    let config = Config::load(&dir)?;
    let addr = listen.unwrap_or_else(|| config.server.listen.clone());

    // Opened per request; fail now if the archive is unusable
    let archive = ArchiveHandle::file(Config::db_path(&dir));
    archive
        .with_repository(|_| Ok(()))
        .context("Failed to open the archive")?;

    if let Ok(logger) = LoggingService::new(&dir, EntryPoint::Server, env!("CARGO_PKG_VERSION")) {
        let _ = logger.log(LogEvent::new("server_started"));
    }

    let state = Arc::new(AppState { archive });

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!("Listening on {}", addr);
        output::info(&format!("Serving the archive on http://{}", addr));
        axum::serve(listener, app_router(state)).await?;
        Ok(())
    })
}
