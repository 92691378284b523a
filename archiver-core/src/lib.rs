//! SimpleFIN Archiver Core - reconcile bank data into a local DuckDB archive
//!
//! Hexagonal layout:
//!
//! - **domain**: Account aggregates, transactions, balances, query logs
//! - **ports**: Traits the reconciler and sync depend on (AccountGraph, DataProvider)
//! - **services**: Reconciliation, sync, reads, event log
//! - **adapters**: DuckDB, SimpleFIN Bridge, Venmo emails

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbRepository;
use adapters::simplefin::SimpleFinProvider;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{
    Account, AccountBasic, Balance, BalanceEntry, QueryLog, QueryResult, Transaction,
    TransactionEntry,
};
pub use services::{EntryPoint, LogEvent, LoggingService, ReconcileReport};

/// Main context for archiver operations
///
/// Opens the archive, applies migrations and wires up the services that
/// only need storage. Syncing goes through [`simplefin_sync_service`], which
/// does not keep the archive open.
pub struct ArchiverContext {
    pub status_service: StatusService,
    pub query_service: QueryService,
}

impl ArchiverContext {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db_path = Config::db_path(data_dir);

        let repository = Arc::new(
            DuckDbRepository::new(&db_path)
                .with_context(|| format!("Failed to open archive {}", db_path.display()))?,
        );
        repository.ensure_schema()?;

        Ok(Self {
            status_service: StatusService::new(Arc::clone(&repository)),
            query_service: QueryService::new(repository),
        })
    }
}

/// Sync service fetching from SimpleFIN into the archive in `data_dir`.
///
/// The archive file is opened only after the fetch, under the sync lock.
pub fn simplefin_sync_service(
    data_dir: &Path,
    access_url: &str,
    timeout: Duration,
) -> Result<SyncService> {
    let provider = SimpleFinProvider::new(access_url, timeout)?;
    Ok(SyncService::for_archive_file(
        &Config::db_path(data_dir),
        Arc::new(provider),
        data_dir,
    ))
}
