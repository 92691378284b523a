//! Status command - show archive summary

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        return output::print_json(&status);
    }

    println!("{}", "Archive Status".bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Accounts", &status.total_accounts.to_string()]);
    table.add_row(vec!["Transactions", &status.total_transactions.to_string()]);
    table.add_row(vec!["Balances", &status.total_balances.to_string()]);
    table.add_row(vec!["Fetches", &status.total_queries.to_string()]);
    if let Some(last) = &status.last_queried_at {
        table.add_row(vec!["Last fetch".to_string(), output::format_datetime(last)]);
    }
    println!("{}", table);
    println!();

    if let (Some(earliest), Some(latest)) = (&status.date_range.earliest, &status.date_range.latest) {
        println!(
            "Date range: {} to {}",
            output::format_date(earliest),
            output::format_date(latest)
        );
        println!();
    }

    if !status.accounts.is_empty() {
        println!("{}", "Accounts".bold());
        for account in &status.accounts {
            println!("  • {} / {} ({})", account.bank, account.name, account.currency);
        }
    }

    Ok(())
}
