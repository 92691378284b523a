//! Data aggregation provider port
//!
//! Defines the interface for fetching account graphs from external
//! sources (SimpleFIN, parsed Venmo emails, test fixtures).

use chrono::{DateTime, Utc};

use crate::domain::result::Result;
use crate::domain::QueryResult;

/// Data aggregation provider trait
///
/// Implementations fetch a complete, normalized account graph. The
/// SyncService persists whatever comes back without knowing which
/// provider produced it.
pub trait DataProvider: Send + Sync {
    /// Provider name (e.g., "simplefin")
    fn name(&self) -> &str;

    /// Fetch accounts with their transactions and balances
    ///
    /// # Arguments
    /// * `start_date` - Earliest transaction date to request
    fn fetch(&self, start_date: DateTime<Utc>) -> Result<QueryResult>;
}
