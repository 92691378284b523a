//! Account graph port - the store as seen by reconciliation

use std::collections::HashSet;

use crate::domain::result::Result;
use crate::domain::{Account, Balance, QueryLog, Transaction};

/// Storage operations needed by a single reconciliation pass.
///
/// An implementation is expected to be scoped to one storage transaction:
/// every read sees the writes made earlier in the same pass, and nothing
/// becomes visible to other readers until the owner commits.
pub trait AccountGraph {
    /// Whether an account with this id is stored
    fn account_exists(&self, account_id: &str) -> Result<bool>;

    /// Ids of the transactions stored for an account
    fn transaction_ids(&self, account_id: &str) -> Result<HashSet<String>>;

    /// Ids of the balances stored for an account
    fn balance_ids(&self, account_id: &str) -> Result<HashSet<String>>;

    /// Insert the account row only (collections are appended separately)
    fn insert_account(&mut self, account: &Account) -> Result<()>;

    /// Refresh the mutable fields (bank, name, currency, raw payload)
    fn update_account(&mut self, account: &Account) -> Result<()>;

    fn insert_transactions(&mut self, transactions: &[Transaction]) -> Result<()>;

    fn insert_balances(&mut self, balances: &[Balance]) -> Result<()>;

    fn insert_query_log(&mut self, query_log: &QueryLog) -> Result<()>;
}
