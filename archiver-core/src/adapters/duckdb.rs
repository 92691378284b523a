//! DuckDB repository implementation

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountBasic, Balance, BalanceEntry, QueryLog, QueryResult, Transaction,
    TransactionEntry,
};
use crate::ports::AccountGraph;
use crate::services::reconcile::{reconcile, ReconcileReport};
use crate::services::{DateRange, MigrationResult, MigrationService};

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Whether an open error is a file lock held by another process
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// A key clash on a leaf row means the id is stored under another account
fn leaf_insert_error(kind: &str, id: &str, err: duckdb::Error) -> Error {
    let msg = err.to_string();
    if msg.contains("Constraint Error") || msg.to_lowercase().contains("duplicate key") {
        Error::integrity(format!(
            "{} '{}' is already archived under another account: {}",
            kind, id, msg
        ))
    } else {
        err.into()
    }
}

const TRANSACTION_COLUMNS: &str = "t.id, t.account_id, t.posted::VARCHAR, t.transacted_at::VARCHAR,
    t.amount::VARCHAR, t.description, t.payee, t.memo, t.category, t.tags::VARCHAR, t.notes,
    t.pending, t.raw_json::VARCHAR, t.extra_attrs::VARCHAR";

const BALANCE_COLUMNS: &str = "b.id, b.account_id, b.balance::VARCHAR, b.available_balance::VARCHAR,
    b.balance_date::VARCHAR";

/// DuckDB-backed archive of accounts, transactions, balances and query logs
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the archive at `db_path`.
    ///
    /// Lock errors from another process holding the file are retried with
    /// exponential backoff before giving up.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    })
                }
                Err(e) if attempt + 1 < MAX_RETRIES && is_retryable_error(&e.to_string()) => {
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    warn!(
                        path = %db_path.display(),
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "database busy, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// In-memory archive, gone when dropped
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extensions used (json) are statically linked; never autoload from ~/.duckdb
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("connection lock poisoned: {}", e)))
    }

    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure the schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        let result = self.run_migrations()?;
        if !result.applied.is_empty() {
            debug!(applied = ?result.applied, "migrations applied");
        }
        Ok(())
    }

    // === Reconciliation ===

    /// Merge a fetched account graph into the archive as one unit.
    ///
    /// Runs entirely inside a single DuckDB transaction: any error leaves
    /// the archive exactly as it was. With `dry_run` the transaction is
    /// rolled back after the report is computed.
    pub fn persist(&self, result: QueryResult, dry_run: bool) -> Result<ReconcileReport> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let report = {
            let mut graph = DuckDbGraph { conn: &tx };
            reconcile(&mut graph, result.accounts, result.query_log.as_ref())?
        };

        if dry_run {
            tx.rollback()?;
        } else {
            tx.commit()?;
        }
        Ok(report)
    }

    // === Accounts ===

    /// All accounts ordered by (bank, name), without their collections
    pub fn get_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, bank, name, currency, raw_json::VARCHAR
             FROM accounts ORDER BY bank, name, id",
        )?;
        let rows = stmt
            .query_map([], AccountRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(AccountRow::into_account).collect()
    }

    /// One account with every stored transaction and balance
    pub fn get_account_graph(&self, account_id: &str) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, bank, name, currency, raw_json::VARCHAR FROM accounts WHERE id = ?",
        )?;
        let row = stmt
            .query_map([account_id], AccountRow::from_row)?
            .next()
            .transpose()?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions t WHERE t.account_id = ? ORDER BY t.transacted_at DESC, t.id",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map([account_id], TransactionRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(TransactionRow::into_transaction)
            .collect::<Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM balances b WHERE b.account_id = ? ORDER BY b.balance_date DESC, b.id",
            BALANCE_COLUMNS
        ))?;
        let balances = stmt
            .query_map([account_id], BalanceRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(BalanceRow::into_balance)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(
            row.into_account()?
                .with_transactions(transactions)
                .with_balances(balances),
        ))
    }

    pub fn get_account_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM accounts")
    }

    // === Transactions ===

    /// Transactions across all accounts, newest `transacted_at` first
    pub fn get_transactions(&self, limit: Option<usize>) -> Result<Vec<TransactionEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, a.bank, a.name
             FROM transactions t JOIN accounts a ON a.id = t.account_id
             ORDER BY t.transacted_at DESC, t.id
             LIMIT ?",
            TRANSACTION_COLUMNS
        ))?;
        let rows = stmt
            .query_map([limit_param(limit)], |row| {
                Ok((TransactionRow::from_row(row)?, row.get::<_, String>(14)?, row.get::<_, String>(15)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(tx, bank, name)| {
                let account = AccountBasic {
                    id: tx.account_id.clone(),
                    bank,
                    name,
                };
                Ok(TransactionEntry {
                    transaction: tx.into_transaction()?,
                    account,
                })
            })
            .collect()
    }

    pub fn get_transaction_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM transactions")
    }

    /// Earliest and latest `transacted_at` in the archive
    pub fn get_transaction_date_range(&self) -> Result<DateRange> {
        let conn = self.conn()?;
        let (earliest, latest): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(transacted_at)::VARCHAR, MAX(transacted_at)::VARCHAR FROM transactions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(DateRange {
            earliest: earliest.as_deref().map(parse_timestamp).transpose()?,
            latest: latest.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    // === Balances ===

    /// Balances across all accounts, newest `balance_date` first
    pub fn get_balances(&self, limit: Option<usize>) -> Result<Vec<BalanceEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, a.bank, a.name
             FROM balances b JOIN accounts a ON a.id = b.account_id
             ORDER BY b.balance_date DESC, b.id
             LIMIT ?",
            BALANCE_COLUMNS
        ))?;
        let rows = stmt
            .query_map([limit_param(limit)], |row| {
                Ok((BalanceRow::from_row(row)?, row.get::<_, String>(5)?, row.get::<_, String>(6)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(b, bank, name)| {
                let account = AccountBasic {
                    id: b.account_id.clone(),
                    bank,
                    name,
                };
                Ok(BalanceEntry {
                    balance: b.into_balance()?,
                    account,
                })
            })
            .collect()
    }

    /// Append one manually reported balance.
    ///
    /// Fails with `NotFound` when the account is unknown and `Conflict`
    /// when the balance id is already stored.
    pub fn add_balance(&self, balance: &Balance) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut graph = DuckDbGraph { conn: &tx };
            if !graph.account_exists(&balance.account_id)? {
                return Err(Error::not_found(format!("account '{}'", balance.account_id)));
            }
            let exists: i64 = tx.query_row(
                "SELECT COUNT(*) FROM balances WHERE id = ?",
                [&balance.id],
                |row| row.get(0),
            )?;
            if exists > 0 {
                return Err(Error::Conflict(format!("balance '{}' already exists", balance.id)));
            }
            graph.insert_balances(std::slice::from_ref(balance))?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_balance_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM balances")
    }

    // === Query log ===

    pub fn count_query_logs(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM query_log")
    }

    /// When the most recent fetch was recorded
    pub fn last_queried_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let latest: Option<String> =
            conn.query_row("SELECT MAX(queried_at)::VARCHAR FROM query_log", [], |row| row.get(0))?;
        latest.as_deref().map(parse_timestamp).transpose()
    }

    fn count(&self, sql: &str) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row(sql, [], |row| row.get(0))?)
    }
}

/// How a long-running component reaches the archive.
///
/// DuckDB lets only one process hold a file open for writing. `Shared`
/// keeps one connection for the component's lifetime; `File` opens the
/// archive for a single call and closes it again, leaving the file free
/// for other `sfa` processes in between.
pub enum ArchiveHandle {
    Shared(Arc<DuckDbRepository>),
    File {
        path: PathBuf,
        /// Serializes opens within this process
        gate: Mutex<()>,
    },
}

impl ArchiveHandle {
    pub fn shared(repository: Arc<DuckDbRepository>) -> Self {
        Self::Shared(repository)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File {
            path: path.into(),
            gate: Mutex::new(()),
        }
    }

    /// Run `f` against the archive, opening (and migrating) it first when
    /// backed by a file
    pub fn with_repository<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Arc<DuckDbRepository>) -> Result<T>,
    {
        match self {
            Self::Shared(repository) => f(repository),
            Self::File { path, gate } => {
                let _guard = gate
                    .lock()
                    .map_err(|e| Error::database(format!("archive gate poisoned: {}", e)))?;
                let repository = Arc::new(DuckDbRepository::new(path)?);
                repository.ensure_schema()?;
                f(&repository)
            }
        }
    }
}

/// [`AccountGraph`] over an open DuckDB transaction
struct DuckDbGraph<'c> {
    conn: &'c Connection,
}

impl DuckDbGraph<'_> {
    fn id_set(&self, sql: &str, account_id: &str) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map([account_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(ids)
    }
}

impl AccountGraph for DuckDbGraph<'_> {
    fn account_exists(&self, account_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE id = ?",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn transaction_ids(&self, account_id: &str) -> Result<HashSet<String>> {
        self.id_set("SELECT id FROM transactions WHERE account_id = ?", account_id)
    }

    fn balance_ids(&self, account_id: &str) -> Result<HashSet<String>> {
        self.id_set("SELECT id FROM balances WHERE account_id = ?", account_id)
    }

    fn insert_account(&mut self, account: &Account) -> Result<()> {
        self.conn.execute(
            "INSERT INTO accounts (id, bank, name, currency, raw_json) VALUES (?, ?, ?, ?, ?)",
            params![
                account.id,
                account.bank,
                account.name,
                account.currency,
                json_text(&account.raw)?,
            ],
        )?;
        Ok(())
    }

    fn update_account(&mut self, account: &Account) -> Result<()> {
        // Key columns are never touched: transactions and balances reference them
        self.conn.execute(
            "UPDATE accounts
             SET bank = ?, name = ?, currency = ?, raw_json = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![
                account.bank,
                account.name,
                account.currency,
                json_text(&account.raw)?,
                account.id,
            ],
        )?;
        Ok(())
    }

    fn insert_transactions(&mut self, transactions: &[Transaction]) -> Result<()> {
        if transactions.is_empty() {
            return Ok(());
        }
        let mut stmt = self.conn.prepare(
            "INSERT INTO transactions (id, account_id, posted, transacted_at, amount, description,
                                       payee, memo, category, tags, notes, pending, raw_json, extra_attrs)
             VALUES (?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), CAST(? AS DECIMAL(18, 4)),
                     ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for tx in transactions {
            stmt.execute(params![
                tx.id,
                tx.account_id,
                format_timestamp(&tx.posted),
                format_timestamp(&tx.transacted_at),
                tx.amount.to_string(),
                tx.description,
                tx.payee,
                tx.memo,
                tx.category,
                serde_json::to_string(&tx.tags)?,
                tx.notes,
                tx.pending,
                json_text(&tx.raw)?,
                tx.extra_attrs.as_ref().map(serde_json::to_string).transpose()?,
            ])
            .map_err(|e| leaf_insert_error("transaction", &tx.id, e))?;
        }
        Ok(())
    }

    fn insert_balances(&mut self, balances: &[Balance]) -> Result<()> {
        if balances.is_empty() {
            return Ok(());
        }
        let mut stmt = self.conn.prepare(
            "INSERT INTO balances (id, account_id, balance, available_balance, balance_date)
             VALUES (?, ?, CAST(? AS DECIMAL(18, 4)), CAST(? AS DECIMAL(18, 4)), CAST(? AS TIMESTAMP))",
        )?;
        for b in balances {
            stmt.execute(params![
                b.id,
                b.account_id,
                b.balance.to_string(),
                b.available_balance.to_string(),
                format_timestamp(&b.balance_date),
            ])
            .map_err(|e| leaf_insert_error("balance", &b.id, e))?;
        }
        Ok(())
    }

    fn insert_query_log(&mut self, log: &QueryLog) -> Result<()> {
        self.conn.execute(
            "INSERT INTO query_log (id, queried_at, start_date, account_count, transaction_count,
                                    errors, raw_response)
             VALUES (?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), ?, ?, ?, ?)",
            params![
                log.id.to_string(),
                format_timestamp(&log.queried_at),
                log.start_date.as_ref().map(format_timestamp),
                log.account_count,
                log.transaction_count,
                serde_json::to_string(&log.errors)?,
                json_text(&log.raw_response)?,
            ],
        )?;
        Ok(())
    }
}

// Row buffers: columns are read as text inside the driver callback and
// converted to domain types afterwards, so conversion errors propagate.

struct AccountRow {
    id: String,
    bank: String,
    name: String,
    currency: String,
    raw: Option<String>,
}

impl AccountRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            bank: row.get(1)?,
            name: row.get(2)?,
            currency: row.get(3)?,
            raw: row.get(4)?,
        })
    }

    fn into_account(self) -> Result<Account> {
        Ok(Account::new(self.id, self.bank, self.name, &self.currency)
            .with_raw(parse_json(self.raw.as_deref())?))
    }
}

struct TransactionRow {
    id: String,
    account_id: String,
    posted: String,
    transacted_at: String,
    amount: String,
    description: String,
    payee: Option<String>,
    memo: Option<String>,
    category: Option<String>,
    tags: Option<String>,
    notes: Option<String>,
    pending: bool,
    raw: Option<String>,
    extra_attrs: Option<String>,
}

impl TransactionRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            posted: row.get(2)?,
            transacted_at: row.get(3)?,
            amount: row.get(4)?,
            description: row.get(5)?,
            payee: row.get(6)?,
            memo: row.get(7)?,
            category: row.get(8)?,
            tags: row.get(9)?,
            notes: row.get(10)?,
            pending: row.get(11)?,
            raw: row.get(12)?,
            extra_attrs: row.get(13)?,
        })
    }

    fn into_transaction(self) -> Result<Transaction> {
        let tags: Vec<String> = match self.tags.as_deref() {
            Some(s) => serde_json::from_str(s)?,
            None => Vec::new(),
        };
        let mut tx = Transaction::new(
            self.id,
            self.account_id,
            parse_timestamp(&self.posted)?,
            parse_decimal(&self.amount)?,
            self.description,
        )
        .with_transacted_at(Some(parse_timestamp(&self.transacted_at)?))
        .with_payee(self.payee)
        .with_raw(parse_json(self.raw.as_deref())?);
        tx.memo = self.memo;
        tx.category = self.category;
        tx.tags = tags;
        tx.notes = self.notes;
        tx.pending = self.pending;
        tx.extra_attrs = self
            .extra_attrs
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(tx)
    }
}

struct BalanceRow {
    id: String,
    account_id: String,
    balance: String,
    available_balance: String,
    balance_date: String,
}

impl BalanceRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            balance: row.get(2)?,
            available_balance: row.get(3)?,
            balance_date: row.get(4)?,
        })
    }

    fn into_balance(self) -> Result<Balance> {
        Ok(Balance::new(
            self.id,
            self.account_id,
            parse_decimal(&self.balance)?,
            Some(parse_decimal(&self.available_balance)?),
            parse_timestamp(&self.balance_date)?,
        ))
    }
}

// Helper functions

fn limit_param(limit: Option<usize>) -> i64 {
    limit.map(|l| l as i64).unwrap_or(i64::MAX)
}

/// Naive UTC text accepted by `CAST(? AS TIMESTAMP)`
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parse a `TIMESTAMP::VARCHAR` value (stored as naive UTC)
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::database(format!("invalid stored timestamp '{}': {}", s, e)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str_exact(s)
        .or_else(|_| Decimal::from_str(s))
        .map_err(|e| Error::database(format!("invalid stored decimal '{}': {}", s, e)))
}

fn json_text(value: &JsonValue) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(value)?))
}

fn parse_json(s: Option<&str>) -> Result<JsonValue> {
    match s {
        Some(s) => Ok(serde_json::from_str(s)?),
        None => Ok(JsonValue::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn sample_account() -> Account {
        let posted = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();
        let tx = Transaction::new("tx-1", "acct-1", posted, Decimal::new(-1999, 2), "COFFEE")
            .with_transacted_at(Some(Utc.with_ymd_and_hms(2025, 2, 9, 8, 15, 0).unwrap()))
            .with_payee(Some("Corner Cafe".to_string()))
            .with_tags(&["food".to_string(), " food ".to_string(), "daily".to_string()])
            .with_raw(json!({"id": "tx-1", "amount": "-19.99"}));
        let balance = Balance::new(
            Balance::derive_id("acct-1", posted),
            "acct-1",
            Decimal::new(123456, 2),
            Some(Decimal::new(120000, 2)),
            posted,
        );
        Account::new("acct-1", "First Bank", "Checking", "usd")
            .with_raw(json!({"id": "acct-1"}))
            .with_transactions(vec![tx])
            .with_balances(vec![balance])
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error("IO Error: Could not set lock on file"));
        assert!(is_retryable_error("The process cannot access the file"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-01-15 10:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-01-15 10:30:00.000000").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-01-15T10:30:00+00:00").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_format_timestamp_round_trip() {
        let dt = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(&dt)).unwrap(), dt);
    }

    #[test]
    fn test_persist_and_read_back_graph() {
        let repo = repo();
        let report = repo
            .persist(QueryResult::new(vec![sample_account()]), false)
            .unwrap();
        assert_eq!(report.accounts_inserted, 1);

        let stored = repo.get_account_graph("acct-1").unwrap().unwrap();
        assert_eq!(stored.currency, "USD");
        assert_eq!(stored.raw, json!({"id": "acct-1"}));

        let tx = &stored.transactions[0];
        assert_eq!(tx.amount, Decimal::new(-1999, 2));
        assert_eq!(tx.payee.as_deref(), Some("Corner Cafe"));
        assert_eq!(tx.tags, vec!["food", "daily"]);
        assert_eq!(tx.transacted_at, Utc.with_ymd_and_hms(2025, 2, 9, 8, 15, 0).unwrap());
        assert_eq!(tx.raw["amount"], "-19.99");

        let balance = &stored.balances[0];
        assert_eq!(balance.balance, Decimal::new(123456, 2));
        assert_eq!(balance.available_balance, Decimal::new(120000, 2));
    }

    #[test]
    fn test_unknown_account_graph_is_none() {
        assert!(repo().get_account_graph("missing").unwrap().is_none());
    }

    #[test]
    fn test_dry_run_leaves_store_untouched() {
        let repo = repo();
        let report = repo
            .persist(QueryResult::new(vec![sample_account()]), true)
            .unwrap();

        assert_eq!(report.transactions_inserted, 1);
        assert_eq!(repo.get_account_count().unwrap(), 0);
        assert_eq!(repo.get_transaction_count().unwrap(), 0);
    }

    #[test]
    fn test_add_balance_errors() {
        let repo = repo();
        repo.persist(QueryResult::new(vec![sample_account()]), false)
            .unwrap();
        let date = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

        let orphan = Balance::new("b-x", "nope", Decimal::ONE, None, date);
        assert!(matches!(repo.add_balance(&orphan), Err(Error::NotFound(_))));

        let fresh = Balance::new("b-new", "acct-1", Decimal::ONE, None, date);
        repo.add_balance(&fresh).unwrap();
        assert!(matches!(repo.add_balance(&fresh), Err(Error::Conflict(_))));
        assert_eq!(repo.get_balance_count().unwrap(), 2);
    }

    #[test]
    fn test_query_log_recorded() {
        let repo = repo();
        let log = QueryLog::new(json!({"errors": [], "accounts": []}));
        repo.persist(QueryResult::default().with_query_log(log), false)
            .unwrap();

        assert_eq!(repo.count_query_logs().unwrap(), 1);
        assert!(repo.last_queried_at().unwrap().is_some());
    }

    #[test]
    fn test_date_range_empty_store() {
        let range = repo().get_transaction_date_range().unwrap();
        assert!(range.earliest.is_none());
        assert!(range.latest.is_none());
    }

    #[test]
    fn test_file_handle_opens_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.duckdb");
        let handle = ArchiveHandle::file(&path);

        let report = handle
            .with_repository(|repo| repo.persist(QueryResult::new(vec![sample_account()]), false))
            .unwrap();
        assert_eq!(report.accounts_inserted, 1);

        // Closed again: a separate connection sees the committed write
        let direct = DuckDbRepository::new(&path).unwrap();
        assert_eq!(direct.get_account_count().unwrap(), 1);
        drop(direct);

        let count = handle.with_repository(|repo| repo.get_account_count()).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_transaction_id_under_other_account_is_integrity_error() {
        let repo = repo();
        repo.persist(QueryResult::new(vec![sample_account()]), false)
            .unwrap();

        let mut tx = sample_account().transactions[0].clone();
        tx.account_id = "acct-2".to_string();
        let other = Account::new("acct-2", "Other Bank", "Card", "USD").with_transactions(vec![tx]);

        let err = repo.persist(QueryResult::new(vec![other]), false).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
        assert!(!err.is_retryable());
        assert_eq!(repo.get_account_count().unwrap(), 1);
    }
}
