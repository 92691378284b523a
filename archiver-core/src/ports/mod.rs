//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The reconciler
//! and sync service depend only on these traits, not on DuckDB or HTTP.

mod data_provider;
mod repository;

pub use data_provider::DataProvider;
pub use repository::AccountGraph;
