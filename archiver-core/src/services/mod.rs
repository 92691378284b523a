//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case.

pub mod logging;
pub mod migration;
mod query;
pub mod reconcile;
mod status;
mod sync;

pub use logging::{EntryPoint, LogEntry, LogEvent, LogStats, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use query::{NewBalance, QueryService};
pub use reconcile::{reconcile, ReconcileReport};
pub use status::{AccountSummary, DateRange, StatusService, StatusSummary};
pub use sync::{SyncLock, SyncOptions, SyncResult, SyncService, SYNC_LOCK_FILENAME};
