//! Reconciliation - merge a fetched account graph into storage
//!
//! Strategy: for every incoming account that is already stored, load the
//! stored transaction and balance id sets once and append only
//! `incoming - stored`. Nothing is ever updated except the account's own
//! mutable fields, and nothing is ever deleted.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, QueryLog};
use crate::ports::AccountGraph;

/// What one reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub accounts_inserted: usize,
    pub accounts_updated: usize,
    pub transactions_inserted: usize,
    /// Incoming transactions whose id was already stored
    pub transactions_skipped: usize,
    pub balances_inserted: usize,
    pub balances_skipped: usize,
    /// Repeated ids inside the incoming batch itself
    pub duplicates_dropped: usize,
    pub query_logs_inserted: usize,
}

impl ReconcileReport {
    /// Whether the pass wrote any account data
    pub fn is_noop(&self) -> bool {
        self.accounts_inserted == 0
            && self.accounts_updated == 0
            && self.transactions_inserted == 0
            && self.balances_inserted == 0
    }
}

/// Reconcile `incoming` against `graph`.
///
/// The caller owns the storage transaction: on `Err` it must roll back,
/// since earlier accounts of the batch may already have been written
/// through `graph`.
pub fn reconcile<G>(
    graph: &mut G,
    incoming: Vec<Account>,
    query_log: Option<&QueryLog>,
) -> Result<ReconcileReport>
where
    G: AccountGraph + ?Sized,
{
    let mut report = ReconcileReport::default();
    let accounts = prepare_batch(incoming, &mut report)?;

    for account in &accounts {
        if graph.account_exists(&account.id)? {
            merge_existing(graph, account, &mut report)?;
        } else {
            debug!(
                account_id = %account.id,
                transactions = account.transactions.len(),
                balances = account.balances.len(),
                "inserting new account"
            );
            graph.insert_account(account)?;
            graph.insert_transactions(&account.transactions)?;
            graph.insert_balances(&account.balances)?;
            report.accounts_inserted += 1;
            report.transactions_inserted += account.transactions.len();
            report.balances_inserted += account.balances.len();
        }
    }

    if let Some(log) = query_log {
        graph.insert_query_log(log)?;
        report.query_logs_inserted += 1;
    }

    Ok(report)
}

/// Append the transactions and balances the store does not have yet
fn merge_existing<G>(graph: &mut G, account: &Account, report: &mut ReconcileReport) -> Result<()>
where
    G: AccountGraph + ?Sized,
{
    graph.update_account(account)?;
    report.accounts_updated += 1;

    let stored_tx_ids = graph.transaction_ids(&account.id)?;
    let new_transactions: Vec<_> = account
        .transactions
        .iter()
        .filter(|tx| !stored_tx_ids.contains(&tx.id))
        .cloned()
        .collect();

    let stored_balance_ids = graph.balance_ids(&account.id)?;
    let new_balances: Vec<_> = account
        .balances
        .iter()
        .filter(|b| !stored_balance_ids.contains(&b.id))
        .cloned()
        .collect();

    debug!(
        account_id = %account.id,
        new_transactions = new_transactions.len(),
        known_transactions = account.transactions.len() - new_transactions.len(),
        new_balances = new_balances.len(),
        "merging into existing account"
    );

    graph.insert_transactions(&new_transactions)?;
    graph.insert_balances(&new_balances)?;

    report.transactions_inserted += new_transactions.len();
    report.transactions_skipped += account.transactions.len() - new_transactions.len();
    report.balances_inserted += new_balances.len();
    report.balances_skipped += account.balances.len() - new_balances.len();
    Ok(())
}

/// Validate linkage and collapse duplicates inside the batch.
///
/// Accounts repeated in the batch are merged (the later record's fields
/// win); a repeated transaction or balance id within one account keeps its
/// first occurrence. An id claimed by two different accounts is an
/// integrity error.
fn prepare_batch(incoming: Vec<Account>, report: &mut ReconcileReport) -> Result<Vec<Account>> {
    let mut accounts: Vec<Account> = Vec::with_capacity(incoming.len());
    let mut position: HashMap<String, usize> = HashMap::new();

    for account in incoming {
        account
            .validate()
            .map_err(|e| Error::validation(format!("account '{}': {}", account.id, e)))?;
        check_linkage(&account)?;

        match position.get(&account.id) {
            Some(&idx) => {
                let merged = &mut accounts[idx];
                merged.bank = account.bank;
                merged.name = account.name;
                merged.currency = account.currency;
                merged.raw = account.raw;
                merged.transactions.extend(account.transactions);
                merged.balances.extend(account.balances);
            }
            None => {
                position.insert(account.id.clone(), accounts.len());
                accounts.push(account);
            }
        }
    }

    let mut tx_owner: HashMap<String, String> = HashMap::new();
    let mut balance_owner: HashMap<String, String> = HashMap::new();

    for account in &mut accounts {
        let before = account.transactions.len() + account.balances.len();

        let mut seen = HashSet::new();
        account.transactions.retain(|tx| seen.insert(tx.id.clone()));
        let mut seen = HashSet::new();
        account.balances.retain(|b| seen.insert(b.id.clone()));

        report.duplicates_dropped += before - account.transactions.len() - account.balances.len();

        for tx in &account.transactions {
            if let Some(owner) = tx_owner.insert(tx.id.clone(), account.id.clone()) {
                return Err(Error::integrity(format!(
                    "transaction '{}' appears under accounts '{}' and '{}'",
                    tx.id, owner, account.id
                )));
            }
        }
        for balance in &account.balances {
            if let Some(owner) = balance_owner.insert(balance.id.clone(), account.id.clone()) {
                return Err(Error::integrity(format!(
                    "balance '{}' appears under accounts '{}' and '{}'",
                    balance.id, owner, account.id
                )));
            }
        }
    }

    Ok(accounts)
}

fn check_linkage(account: &Account) -> Result<()> {
    if let Some(tx) = account.transactions.iter().find(|tx| tx.account_id != account.id) {
        return Err(Error::integrity(format!(
            "transaction '{}' is nested under account '{}' but references account '{}'",
            tx.id, account.id, tx.account_id
        )));
    }
    if let Some(b) = account.balances.iter().find(|b| b.account_id != account.id) {
        return Err(Error::integrity(format!(
            "balance '{}' is nested under account '{}' but references account '{}'",
            b.id, account.id, b.account_id
        )));
    }
    Ok(())
}
