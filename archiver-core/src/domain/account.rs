//! Account domain model

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{Balance, Transaction};

/// A financial account together with the transactions and balances it owns.
///
/// The account is the aggregate root: its `transactions` and `balances`
/// are inserted with it when the account is new, and appended to it when
/// it already exists. `id` is the provider's stable identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Institution name (SimpleFIN `org.name`)
    pub bank: String,
    pub name: String,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    /// Provider payload this account was built from
    #[serde(default)]
    pub raw: JsonValue,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub balances: Vec<Balance>,
}

impl Account {
    /// Create a new account with no transactions or balances
    pub fn new(
        id: impl Into<String>,
        bank: impl Into<String>,
        name: impl Into<String>,
        currency: &str,
    ) -> Self {
        Self {
            id: id.into(),
            bank: bank.into(),
            name: name.into(),
            currency: Self::normalize_currency(currency),
            raw: JsonValue::Null,
            transactions: Vec::new(),
            balances: Vec::new(),
        }
    }

    pub fn with_raw(mut self, raw: JsonValue) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn with_balances(mut self, balances: Vec<Balance>) -> Self {
        self.balances = balances;
        self
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    /// Validate account data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.id.trim().is_empty() {
            return Err("account id cannot be empty");
        }
        if self.currency.trim().is_empty() {
            return Err("currency cannot be empty");
        }
        Ok(())
    }
}

/// Shallow account reference carried by transaction and balance views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBasic {
    pub id: String,
    pub bank: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_normalization() {
        assert_eq!(Account::normalize_currency("usd"), "USD");
        assert_eq!(Account::normalize_currency(" eur "), "EUR");
        assert_eq!(Account::new("a1", "Bank", "Checking", "cad").currency, "CAD");
    }

    #[test]
    fn test_account_validation() {
        let mut account = Account::new("ACT-1", "First Bank", "Checking", "USD");
        assert!(account.validate().is_ok());

        account.id = " ".to_string();
        assert!(account.validate().is_err());

        let account = Account::new("ACT-1", "First Bank", "Checking", "");
        assert_eq!(account.validate(), Err("currency cannot be empty"));
    }
}
