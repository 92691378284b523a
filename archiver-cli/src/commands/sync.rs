//! Sync command - fetch from SimpleFIN and reconcile into the archive

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use archiver_core::config::Config;
use archiver_core::services::SyncResult;
use archiver_core::{simplefin_sync_service, LogEvent};
use colored::Colorize;

use super::{get_data_dir, get_logger, log_event};
use crate::output;

pub struct SyncArgs {
    pub simplefin_key: Option<String>,
    pub simplefin_key_file: Option<PathBuf>,
    pub days_history: Option<u32>,
    pub timeout: Option<u64>,
    pub dry_run: bool,
}

pub fn run(args: SyncArgs, json: bool) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command").with_command("sync"));

    // The archive stays closed until the fetch is done and the sync lock is held
    let dir = get_data_dir()?;
    let config = Config::load(&dir)?;
    let access_url = config
        .resolve_access_url(args.simplefin_key.as_deref(), args.simplefin_key_file.as_deref())?;

    let mut settings = config.sync.clone();
    if let Some(days) = args.days_history {
        settings.days_history = days;
    }
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| settings.timeout());

    let mut service = simplefin_sync_service(&dir, &access_url, timeout)?;
    if let Some(logger) = logger {
        service = service.with_logger(Arc::new(logger));
    }

    let result = service.sync(&settings.to_options(args.dry_run))?;

    if json {
        return output::print_json(&result);
    }
    print_result(&result);
    Ok(())
}

fn print_result(result: &SyncResult) {
    if result.dry_run {
        output::warning("DRY RUN - No changes applied");
        println!();
    }

    println!(
        "{} {} (since {})",
        "Synced:".green(),
        result.provider,
        output::format_date(&result.start_date)
    );
    if result.attempts > 1 {
        println!("  Attempts: {}", result.attempts);
    }
    let report = &result.report;
    println!(
        "  Accounts: {} fetched, {} new, {} updated",
        result.accounts_fetched, report.accounts_inserted, report.accounts_updated
    );
    println!(
        "  Transactions: {} fetched, {} new, {} already archived",
        result.transactions_fetched, report.transactions_inserted, report.transactions_skipped
    );
    println!(
        "  Balances: {} new, {} already archived",
        report.balances_inserted, report.balances_skipped
    );
    if report.duplicates_dropped > 0 {
        println!("  Duplicates in response: {}", report.duplicates_dropped);
    }

    if !result.provider_errors.is_empty() {
        println!();
        println!("{}", "Provider reported:".yellow());
        for message in &result.provider_errors {
            println!("  - {}", message);
        }
    }
}
