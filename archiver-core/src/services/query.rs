//! Query service - read side of the archive

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};
use crate::domain::{Account, Balance, BalanceEntry, TransactionEntry};

/// A manually reported balance
#[derive(Debug, Clone, Deserialize)]
pub struct NewBalance {
    /// Derived from account and date when absent
    #[serde(default)]
    pub id: Option<String>,
    pub account_id: String,
    pub balance: Decimal,
    #[serde(default)]
    pub available_balance: Option<Decimal>,
    pub balance_date: DateTime<Utc>,
}

pub struct QueryService {
    repository: Arc<DuckDbRepository>,
}

impl QueryService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Accounts ordered by (bank, name)
    pub fn accounts(&self) -> Result<Vec<Account>> {
        self.repository.get_accounts()
    }

    /// Transactions, newest `transacted_at` first
    pub fn transactions(&self, limit: Option<usize>) -> Result<Vec<TransactionEntry>> {
        self.repository.get_transactions(limit)
    }

    /// Balances, newest first
    pub fn balances(&self, limit: Option<usize>) -> Result<Vec<BalanceEntry>> {
        self.repository.get_balances(limit)
    }

    /// Append a manually reported balance and return it as stored
    pub fn create_balance(&self, new: NewBalance) -> Result<Balance> {
        let account_id = new.account_id.trim();
        if account_id.is_empty() {
            return Err(Error::validation("account_id cannot be empty"));
        }
        let id = match new.id.map(|s| s.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => Balance::derive_id(account_id, new.balance_date),
        };
        let balance = Balance::new(
            id,
            account_id,
            new.balance,
            new.available_balance,
            new.balance_date,
        );
        self.repository.add_balance(&balance)?;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::domain::QueryResult;

    fn service_with_account() -> QueryService {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();
        repo.persist(
            QueryResult::new(vec![Account::new("acct-1", "First Bank", "Checking", "USD")]),
            false,
        )
        .unwrap();
        QueryService::new(repo)
    }

    fn new_balance(id: Option<&str>) -> NewBalance {
        NewBalance {
            id: id.map(str::to_string),
            account_id: "acct-1".to_string(),
            balance: Decimal::new(42000, 2),
            available_balance: None,
            balance_date: Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_create_balance_derives_id_and_available() {
        let service = service_with_account();
        let created = service.create_balance(new_balance(None)).unwrap();

        assert_eq!(created.id, "acct-1:1746100800");
        assert_eq!(created.available_balance, Decimal::new(42000, 2));
        assert_eq!(service.balances(None).unwrap().len(), 1);
    }

    #[test]
    fn test_create_balance_duplicate_conflicts() {
        let service = service_with_account();
        service.create_balance(new_balance(Some("manual-1"))).unwrap();

        let err = service.create_balance(new_balance(Some("manual-1"))).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_missing_account() {
        let service = service_with_account();
        let mut orphan = new_balance(None);
        orphan.account_id = "nope".to_string();
        assert!(matches!(service.create_balance(orphan), Err(Error::NotFound(_))));
    }
}
