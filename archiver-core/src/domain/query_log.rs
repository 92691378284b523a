//! Fetch audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::Account;

/// Raw record of one fetch against a provider.
///
/// Append-only: written on every sync that carries one, never read back
/// by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLog {
    pub id: Uuid,
    pub queried_at: DateTime<Utc>,
    /// Start of the requested history window
    pub start_date: Option<DateTime<Utc>>,
    pub account_count: i64,
    pub transaction_count: i64,
    /// Provider-reported errors and warnings
    #[serde(default)]
    pub errors: Vec<String>,
    pub raw_response: JsonValue,
}

impl QueryLog {
    pub fn new(raw_response: JsonValue) -> Self {
        Self {
            id: Uuid::new_v4(),
            queried_at: Utc::now(),
            start_date: None,
            account_count: 0,
            transaction_count: 0,
            errors: Vec::new(),
            raw_response,
        }
    }
}

/// Everything one fetch cycle produced, fully materialized before storage
/// is touched
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub accounts: Vec<Account>,
    pub query_log: Option<QueryLog>,
}

impl QueryResult {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts,
            query_log: None,
        }
    }

    pub fn with_query_log(mut self, query_log: QueryLog) -> Self {
        self.query_log = Some(query_log);
        self
    }

    /// Number of transactions across all accounts
    pub fn transaction_count(&self) -> usize {
        self.accounts.iter().map(|a| a.transactions.len()).sum()
    }
}
