//! Adapter implementations
//!
//! - DuckDB for the archive
//! - SimpleFIN Bridge HTTP client as a data provider
//! - Venmo notification emails as a transaction source

pub mod duckdb;
pub mod simplefin;
pub mod venmo;

#[cfg(test)]
pub mod simplefin_mock;
