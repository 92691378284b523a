//! Sync service - fetch from a provider and reconcile into the archive

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::duckdb::{ArchiveHandle, DuckDbRepository};
use crate::domain::result::Result;
use crate::ports::DataProvider;
use crate::services::reconcile::ReconcileReport;
use crate::services::{LogEvent, LoggingService};

pub const SYNC_LOCK_FILENAME: &str = "sync.lock";

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// How far back to request transactions
    pub days_history: u32,
    /// Compute the report, then roll back
    pub dry_run: bool,
    /// Extra attempts after a retryable failure
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            days_history: 14,
            dry_run: false,
            retries: 2,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Outcome of one sync invocation
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub provider: String,
    pub start_date: DateTime<Utc>,
    pub dry_run: bool,
    /// Fetch+persist cycles run, including the successful one
    pub attempts: u32,
    pub accounts_fetched: usize,
    pub transactions_fetched: usize,
    /// Errors the provider reported alongside its data
    pub provider_errors: Vec<String>,
    #[serde(flatten)]
    pub report: ReconcileReport,
}

/// Exclusive advisory lock serializing syncs against one archive.
/// Released when dropped.
pub struct SyncLock {
    file: File,
}

impl SyncLock {
    /// Block until the lock at `path` is held
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = Self::open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    /// Take the lock if nobody holds it
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = Self::open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn open(path: &Path) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?)
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub struct SyncService {
    archive: ArchiveHandle,
    provider: Arc<dyn DataProvider>,
    lock_path: PathBuf,
    logger: Option<Arc<LoggingService>>,
}

impl SyncService {
    /// Sync into an already open repository. The sync lock lives in
    /// `data_dir`, next to the archive.
    pub fn new(
        repository: Arc<DuckDbRepository>,
        provider: Arc<dyn DataProvider>,
        data_dir: &Path,
    ) -> Self {
        Self::with_archive(ArchiveHandle::shared(repository), provider, data_dir)
    }

    /// Sync into the archive file at `db_path`, opened only while the sync
    /// lock is held. Concurrent `sfa sync` processes queue on the lock
    /// instead of on DuckDB's file lock.
    pub fn for_archive_file(db_path: &Path, provider: Arc<dyn DataProvider>, data_dir: &Path) -> Self {
        Self::with_archive(ArchiveHandle::file(db_path), provider, data_dir)
    }

    fn with_archive(archive: ArchiveHandle, provider: Arc<dyn DataProvider>, data_dir: &Path) -> Self {
        Self {
            archive,
            provider,
            lock_path: data_dir.join(SYNC_LOCK_FILENAME),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Fetch and reconcile, retrying the whole cycle on retryable errors.
    ///
    /// Integrity, validation and configuration errors fail immediately.
    pub fn sync(&self, options: &SyncOptions) -> Result<SyncResult> {
        let start_date = Utc::now() - chrono::Duration::days(i64::from(options.days_history));
        let name = self.provider.name().to_string();
        self.record(LogEvent::new("sync_started").with_integration(&name));

        let max_attempts = options.retries + 1;
        let mut attempt = 1;
        loop {
            match self.run_once(start_date, options.dry_run) {
                Ok(mut result) => {
                    result.attempts = attempt;
                    info!(
                        provider = %name,
                        accounts_inserted = result.report.accounts_inserted,
                        transactions_inserted = result.report.transactions_inserted,
                        balances_inserted = result.report.balances_inserted,
                        dry_run = options.dry_run,
                        "sync finished"
                    );
                    self.record(LogEvent::new("sync_completed").with_integration(&name));
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        provider = %name,
                        attempt,
                        max_attempts,
                        error = %e,
                        "sync attempt failed, retrying"
                    );
                    thread::sleep(options.retry_delay);
                    attempt += 1;
                }
                Err(e) => {
                    self.record(
                        LogEvent::new("sync_failed")
                            .with_integration(&name)
                            .with_error(e.to_string())
                            .with_error_details(format!("attempt {}/{}", attempt, max_attempts)),
                    );
                    return Err(e);
                }
            }
        }
    }

    fn run_once(&self, start_date: DateTime<Utc>, dry_run: bool) -> Result<SyncResult> {
        // Network I/O completes before the archive is touched
        let fetched = self.provider.fetch(start_date)?;
        let accounts_fetched = fetched.accounts.len();
        let transactions_fetched = fetched.transaction_count();
        let provider_errors = fetched
            .query_log
            .as_ref()
            .map(|log| log.errors.clone())
            .unwrap_or_default();
        for message in &provider_errors {
            warn!(provider = self.provider.name(), message = %message, "provider reported an error");
        }

        let _lock = SyncLock::acquire(&self.lock_path)?;
        let report = self
            .archive
            .with_repository(|repo| repo.persist(fetched, dry_run))?;

        Ok(SyncResult {
            provider: self.provider.name().to_string(),
            start_date,
            dry_run,
            attempts: 1,
            accounts_fetched,
            transactions_fetched,
            provider_errors,
            report,
        })
    }

    fn record(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            if let Err(e) = logger.log(event) {
                warn!(error = %e, "failed to write event log");
            }
        }
    }
}
