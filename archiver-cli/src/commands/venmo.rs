//! Venmo command - archive transactions parsed from notification emails

use std::path::Path;

use anyhow::{Context, Result};
use archiver_core::adapters::duckdb::ArchiveHandle;
use archiver_core::adapters::venmo::{parse_messages, venmo_account, VenmoMessage};
use archiver_core::config::Config;
use archiver_core::services::{SyncLock, SYNC_LOCK_FILENAME};
use archiver_core::{LogEvent, QueryResult};

use super::{get_data_dir, get_logger, log_event};
use crate::output;

pub fn run(file: &Path, account_id: &str, dry_run: bool, json: bool) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command").with_command("venmo"));

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let messages: Vec<VenmoMessage> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid message file {}", file.display()))?;

    let transactions = parse_messages(&messages, account_id);
    let parsed = transactions.len();

    // Same write path as a sync: queue on the sync lock, then open the archive
    let dir = get_data_dir()?;
    let report = {
        let _lock = SyncLock::acquire(&dir.join(SYNC_LOCK_FILENAME))?;
        let batch = QueryResult::new(vec![venmo_account(account_id, transactions)]);
        ArchiveHandle::file(Config::db_path(&dir))
            .with_repository(|repo| repo.persist(batch, dry_run))?
    };

    if json {
        return output::print_json(&serde_json::json!({
            "messages": messages.len(),
            "parsed": parsed,
            "dry_run": dry_run,
            "report": report,
        }));
    }

    if dry_run {
        output::warning("DRY RUN - No changes applied");
    }
    println!("Messages read: {}", messages.len());
    println!("Transactions parsed: {}", parsed);
    output::success(&format!(
        "New transactions: {} ({} already archived)",
        report.transactions_inserted, report.transactions_skipped
    ));
    Ok(())
}
