//! Read-side rows: a leaf entity joined with its owning account

use serde::Serialize;

use super::{AccountBasic, Balance, Transaction};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionEntry {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub account: AccountBasic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceEntry {
    #[serde(flatten)]
    pub balance: Balance,
    pub account: AccountBasic,
}
