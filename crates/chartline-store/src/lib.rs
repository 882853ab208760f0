//! Chartline Store - persistence for crawl output
//!
//! Keyed DuckDB tables with idempotent upsert, and a Parquet snapshot
//! directory that later stages read back.

pub mod database;
pub mod schema;
pub mod sink;
pub mod snapshot;

// Re-exports for convenience
pub use database::{Database, TableCount};
pub use sink::{DATABASE_FILE, StoreSink, StoreStatus};
pub use snapshot::{SnapshotCount, SnapshotDir};
