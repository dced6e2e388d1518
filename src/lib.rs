//! # Relgraph - Schema-aware data access
//!
//! Navigates declared foreign-key relationships between tables and writes
//! records back with optimistic conflict detection.
//!
//! Relgraph provides:
//! - A typed, schema-validated record model with dirty tracking
//! - Key-candidate resolution for identifying rows
//! - Eager relationship walking (`realise`) across any number of hops
//! - Relationship-path compilation into a single joined query (`resolve`)
//! - Version-checked UPDATE/DELETE with stale and ambiguous write detection
//! - SQLite-backed storage behind a pluggable `Store` trait

pub mod value;
pub mod catalog;
pub mod record;
pub mod keys;
pub mod options;
pub mod storage;
pub mod engine;
pub mod graph;
pub mod query;
pub mod write;
pub mod config;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-exports for convenient access
pub use value::Value;
pub use catalog::{SchemaCatalog, TableSchema, StoreTableSchema};
pub use record::{Record, Related};
pub use options::{Options, LockMode};
pub use storage::{Store, StoreError, StoreRegistry, SqliteStore, UpdatePolicy};
pub use engine::Engine;
pub use write::WriteOutcome;

/// Result type alias for Relgraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Relgraph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Table {table} has no schema for store '{store_id}'")]
    UnknownStore { table: String, store_id: String },

    #[error("No store registered as '{0}'")]
    UnregisteredStore(String),

    #[error("Unknown column: {table}.{column}")]
    UnknownColumn { table: String, column: String },

    #[error("Schema out of sync for {table}: stores {missing:?} are not registered")]
    SchemaSyncMismatch { table: String, missing: Vec<String> },

    #[error("Invalid relationship path: {0}")]
    InvalidPath(String),

    #[error("No foreign key joins {from} to {to}")]
    UnknownRelationship { from: String, to: String },

    #[error("Write on {table} matched {rows} rows")]
    AmbiguousWrite { table: String, rows: usize },

    #[error("Value for {table}.{column} exceeds {max_length}")]
    ValueTooLong { table: String, column: String, max_length: u32 },

    #[error("Lock property {0} does not hold a numeric value")]
    InvalidLockValue(String),

    #[error("Nothing to update on {0}")]
    EmptyUpdate(String),

    #[error("Record of {0} has no properties to match its row")]
    MissingIdentity(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(err.into())
    }
}
