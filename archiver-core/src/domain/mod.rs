//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with normalization logic - no I/O or external dependencies.

mod account;
pub mod balance;
mod entry;
mod query_log;
pub mod result;
mod transaction;

pub use account::{Account, AccountBasic};
pub use balance::Balance;
pub use entry::{BalanceEntry, TransactionEntry};
pub use query_log::{QueryLog, QueryResult};
pub use transaction::Transaction;
