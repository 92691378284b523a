//! Listing commands - accounts, transactions and balances

use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

use super::get_context;
use crate::output;

pub fn accounts(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let accounts = ctx.query_service.accounts()?;

    if json {
        let rows: Vec<_> = accounts
            .iter()
            .map(|a| {
                serde_json::json!({
                    "id": a.id,
                    "bank": a.bank,
                    "name": a.name,
                    "currency": a.currency,
                })
            })
            .collect();
        return output::print_json(&rows);
    }

    if accounts.is_empty() {
        output::info("No accounts archived yet. Run 'sfa sync'.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Bank", "Name", "Currency", "ID"]);
    for a in &accounts {
        table.add_row(vec![&a.bank, &a.name, &a.currency, &a.id]);
    }
    println!("{}", table);
    Ok(())
}

pub fn transactions(limit: Option<usize>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let entries = ctx.query_service.transactions(limit)?;

    if json {
        return output::print_json(&entries);
    }

    if entries.is_empty() {
        output::info("No transactions archived yet.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Date", "Account", "Description", "Amount"]);
    for entry in &entries {
        let tx = &entry.transaction;
        table.add_row(vec![
            Cell::new(output::format_date(&tx.transacted_at)),
            Cell::new(format!("{} / {}", entry.account.bank, entry.account.name)),
            Cell::new(&tx.description),
            Cell::new(tx.amount.to_string()).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub fn balances(limit: Option<usize>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let entries = ctx.query_service.balances(limit)?;

    if json {
        return output::print_json(&entries);
    }

    if entries.is_empty() {
        output::info("No balances archived yet.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Date", "Account", "Balance", "Available"]);
    for entry in &entries {
        let b = &entry.balance;
        table.add_row(vec![
            Cell::new(output::format_date(&b.balance_date)),
            Cell::new(format!("{} / {}", entry.account.bank, entry.account.name)),
            Cell::new(b.balance.to_string()).set_alignment(CellAlignment::Right),
            Cell::new(b.available_balance.to_string()).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{}", table);
    Ok(())
}
