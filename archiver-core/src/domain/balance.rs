//! Balance domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An account balance as reported at `balance_date`.
///
/// Append-only like transactions: stored balances are never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub id: String,
    pub account_id: String,
    pub balance: Decimal,
    /// Equals `balance` unless the provider reported an available balance
    pub available_balance: Decimal,
    pub balance_date: DateTime<Utc>,
}

impl Balance {
    /// Create a balance, filling a missing available balance from `balance`
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        balance: Decimal,
        available_balance: Option<Decimal>,
        balance_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            balance,
            available_balance: available_balance.unwrap_or(balance),
            balance_date,
        }
    }

    /// Stable id for a provider that does not issue balance ids:
    /// one balance per account per reported timestamp
    pub fn derive_id(account_id: &str, balance_date: DateTime<Utc>) -> String {
        format!("{}:{}", account_id, balance_date.timestamp())
    }
}
