//! Transaction domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single posted transaction belonging to an account.
///
/// Transactions are immutable once stored: a later sync that carries the
/// same `id` is dropped, never merged into the stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub posted: DateTime<Utc>,
    /// When the transaction actually happened; equals `posted` unless the
    /// provider reported otherwise
    pub transacted_at: DateTime<Utc>,
    /// Signed amount, negative = outflow
    pub amount: Decimal,
    pub description: String,
    pub payee: Option<String>,
    pub memo: Option<String>,
    pub category: Option<String>,
    /// Normalized tag list (see [`Transaction::normalize_tags`])
    #[serde(default)]
    pub tags: Vec<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub pending: bool,
    /// Provider payload this transaction was built from
    #[serde(default)]
    pub raw: JsonValue,
    /// Provider `extra` blob pass-through
    pub extra_attrs: Option<JsonValue>,
}

impl Transaction {
    /// Create a new transaction with required fields.
    ///
    /// `transacted_at` starts out equal to `posted`.
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        posted: DateTime<Utc>,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            posted,
            transacted_at: posted,
            amount,
            description: description.into(),
            payee: None,
            memo: None,
            category: None,
            tags: Vec::new(),
            notes: None,
            pending: false,
            raw: JsonValue::Null,
            extra_attrs: None,
        }
    }

    /// Set the effective date; `None` keeps the posted date
    pub fn with_transacted_at(mut self, transacted_at: Option<DateTime<Utc>>) -> Self {
        self.transacted_at = transacted_at.unwrap_or(self.posted);
        self
    }

    pub fn with_payee(mut self, payee: Option<String>) -> Self {
        self.payee = payee;
        self
    }

    pub fn with_tags(mut self, tags: &[String]) -> Self {
        self.tags = Self::normalize_tags(tags);
        self
    }

    pub fn with_raw(mut self, raw: JsonValue) -> Self {
        self.raw = raw;
        self
    }

    /// Normalize tags: deduplicate, trim whitespace, remove empty
    pub fn normalize_tags(tags: &[String]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();

        for tag in tags {
            let trimmed = tag.trim().to_string();
            if !trimmed.is_empty() && seen.insert(trimmed.clone()) {
                result.push(trimmed);
            }
        }

        result
    }
}
