//! Storage Layer - statement execution against backing stores
//!
//! The engine talks to every store through the [`Store`] trait:
//! - `query` returns rows as ordered column → value maps
//! - `execute` returns the affected row count
//! - transactions carry an [`UpdatePolicy`] consulted by optimistic writes
//! - savepoints let a single write be undone inside or outside a transaction
//!
//! [`SqliteStore`] is the bundled implementation.

pub mod sql;
pub mod sqlite;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use crate::{Error, Result};
use crate::value::Value;

pub use sqlite::SqliteStore;

/// One result row, keyed by column label
pub type Row = IndexMap<String, Value>;

/// How many rows a single UPDATE/DELETE may touch inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// More than one affected row is a fatal ambiguity
    #[default]
    UniqueOnly,
    /// Multi-row writes are allowed when no lock property is involved
    Multiple,
}

/// Failure reported by the underlying driver
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    /// Driver-specific error code, when the driver has one
    pub code: Option<i32>,
    pub message: String,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(e, _) => Some(e.extended_code),
            _ => None,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// Statement executor for one backing store
pub trait Store {
    /// Identifier this store is registered under
    fn store_id(&self) -> &str;

    /// Run a query and collect every row
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement and return the number of affected rows
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Value generated for the sequenced column of the last insert
    fn last_insert_id(&self) -> Result<i64>;

    fn begin(&self, policy: UpdatePolicy) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    /// Open a named savepoint, nested inside any active transaction
    fn savepoint(&self, name: &str) -> Result<()>;

    /// Undo everything since the savepoint, leaving it open
    fn rollback_to(&self, name: &str) -> Result<()>;

    /// Close the savepoint, keeping its changes
    fn release(&self, name: &str) -> Result<()>;

    /// Row written by the last insert into `table_name`, when the store
    /// can still find it
    fn inserted_row(&self, table_name: &str) -> Result<Option<Row>>;

    /// Policy of the active transaction, or the default outside one
    fn update_policy(&self) -> UpdatePolicy;
}

/// Live stores, keyed by store id
#[derive(Default)]
pub struct StoreRegistry {
    stores: IndexMap<String, Box<dyn Store>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store under its own id, replacing any previous one
    pub fn register(&mut self, store: impl Store + 'static) {
        self.stores.insert(store.store_id().to_string(), Box::new(store));
    }

    pub fn with(mut self, store: impl Store + 'static) -> Self {
        self.register(store);
        self
    }

    pub fn contains(&self, store_id: &str) -> bool {
        self.stores.contains_key(store_id)
    }

    pub fn get(&self, store_id: &str) -> Result<&dyn Store> {
        self.stores
            .get(store_id)
            .map(|s| s.as_ref())
            .ok_or_else(|| Error::UnregisteredStore(store_id.to_string()))
    }

    pub fn store_ids(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = StoreRegistry::new()
            .with(SqliteStore::open_in_memory().unwrap())
            .with(SqliteStore::open_in_memory().unwrap().with_store_id("archive"));

        assert!(registry.contains("main"));
        assert_eq!(registry.get("archive").unwrap().store_id(), "archive");
        assert!(matches!(registry.get("nope"), Err(Error::UnregisteredStore(_))));
        assert_eq!(registry.store_ids().collect::<Vec<_>>(), vec!["main", "archive"]);
    }

    #[test]
    fn test_store_error_carries_code() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.execute("INSERT INTO missing VALUES (1)", &[]).unwrap_err();
        match err {
            Error::Store(e) => {
                assert!(e.code.is_some());
                assert!(e.message.contains("missing"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
