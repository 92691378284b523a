//! Status service - archive summary

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;

pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    pub fn get_status(&self) -> Result<StatusSummary> {
        let accounts = self.repository.get_accounts()?;

        Ok(StatusSummary {
            total_accounts: accounts.len() as i64,
            total_transactions: self.repository.get_transaction_count()?,
            total_balances: self.repository.get_balance_count()?,
            total_queries: self.repository.count_query_logs()?,
            last_queried_at: self.repository.last_queried_at()?,
            date_range: self.repository.get_transaction_date_range()?,
            accounts: accounts
                .into_iter()
                .map(|a| AccountSummary {
                    id: a.id,
                    bank: a.bank,
                    name: a.name,
                    currency: a.currency,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_accounts: i64,
    pub total_transactions: i64,
    pub total_balances: i64,
    /// Fetches recorded in the query log
    pub total_queries: i64,
    pub last_queried_at: Option<DateTime<Utc>>,
    pub date_range: DateRange,
    pub accounts: Vec<AccountSummary>,
}

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub id: String,
    pub bank: String,
    pub name: String,
    pub currency: String,
}

/// Span of `transacted_at` across the archive
#[derive(Debug, Serialize)]
pub struct DateRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}
