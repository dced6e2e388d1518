//! SQLite storage implementation

use std::cell::Cell;
use std::path::Path;
use rusqlite::{Connection, params_from_iter};
use crate::Result;
use crate::catalog::{SchemaCatalog, ddl};
use crate::value::Value;
use super::sql::quote_ident;
use super::{Row, Store, UpdatePolicy};

/// Store id used when none is given
pub const DEFAULT_STORE_ID: &str = "main";

/// SQLite-backed store
pub struct SqliteStore {
    conn: Connection,
    store_id: String,
    /// Policy of the open transaction, `None` outside one
    transaction: Cell<Option<UpdatePolicy>>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(Self {
            conn,
            store_id: DEFAULT_STORE_ID.to_string(),
            transaction: Cell::new(None),
        })
    }

    /// Register this store under a different id
    pub fn with_store_id(mut self, store_id: impl Into<String>) -> Self {
        self.store_id = store_id.into();
        self
    }

    /// Create every catalog table that has a schema for this store
    pub fn initialize_schema(&self, catalog: &SchemaCatalog) -> Result<()> {
        for stmt in ddl::all_schema_statements(catalog, &self.store_id)? {
            self.conn.execute(&stmt, [])?;
        }
        Ok(())
    }

    /// Run raw SQL, e.g. seed data
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.get().is_some()
    }
}

impl Store for SqliteStore {
    fn store_id(&self) -> &str {
        &self.store_id
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!("[{}] query: {} {:?}", self.store_id, sql, params);
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Row::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                values.insert(column.clone(), Value::from(row.get_ref(i)?));
            }
            result.push(values);
        }

        Ok(result)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        tracing::debug!("[{}] execute: {} {:?}", self.store_id, sql, params);
        let count = self.conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(count)
    }

    fn last_insert_id(&self) -> Result<i64> {
        Ok(self.conn.last_insert_rowid())
    }

    /// Begin a transaction for a versioned write sequence
    fn begin(&self, policy: UpdatePolicy) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", [])?;
        self.transaction.set(Some(policy));
        Ok(())
    }

    /// Commit a transaction
    fn commit(&self) -> Result<()> {
        self.conn.execute("COMMIT", [])?;
        self.transaction.set(None);
        Ok(())
    }

    /// Rollback a transaction
    fn rollback(&self) -> Result<()> {
        self.conn.execute("ROLLBACK", [])?;
        self.transaction.set(None);
        Ok(())
    }

    fn savepoint(&self, name: &str) -> Result<()> {
        self.conn.execute_batch(&format!("SAVEPOINT {}", quote_ident(name)))?;
        Ok(())
    }

    fn rollback_to(&self, name: &str) -> Result<()> {
        self.conn.execute_batch(&format!("ROLLBACK TO SAVEPOINT {}", quote_ident(name)))?;
        Ok(())
    }

    fn release(&self, name: &str) -> Result<()> {
        self.conn.execute_batch(&format!("RELEASE SAVEPOINT {}", quote_ident(name)))?;
        Ok(())
    }

    fn inserted_row(&self, table_name: &str) -> Result<Option<Row>> {
        let sql = format!("SELECT * FROM {} WHERE rowid = ?1", quote_ident(table_name));
        let rows = self.query(&sql, &[Value::Integer(self.conn.last_insert_rowid())])?;
        Ok(rows.into_iter().next())
    }

    fn update_policy(&self) -> UpdatePolicy {
        self.transaction.get().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL)").unwrap();

        let inserted = store
            .execute("INSERT INTO t (name, score) VALUES (?1, ?2)", &[Value::from("a"), Value::Null])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.last_insert_id().unwrap(), 1);

        let rows = store.query("SELECT * FROM t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["id", "name", "score"]);
        assert_eq!(rows[0]["name"], Value::from("a"));
        assert_eq!(rows[0]["score"], Value::Null);
    }

    #[test]
    fn test_transaction_policy() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
        assert_eq!(store.update_policy(), UpdatePolicy::UniqueOnly);

        store.begin(UpdatePolicy::Multiple).unwrap();
        assert!(store.in_transaction());
        assert_eq!(store.update_policy(), UpdatePolicy::Multiple);
        store.execute("INSERT INTO t DEFAULT VALUES", &[]).unwrap();
        store.rollback().unwrap();

        assert_eq!(store.update_policy(), UpdatePolicy::UniqueOnly);
        assert!(store.query("SELECT * FROM t", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_savepoint_outside_transaction() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").unwrap();

        store.savepoint("w").unwrap();
        store.execute("INSERT INTO t (name) VALUES ('a')", &[]).unwrap();
        store.rollback_to("w").unwrap();
        store.release("w").unwrap();
        assert!(store.query("SELECT * FROM t", &[]).unwrap().is_empty());

        store.savepoint("w").unwrap();
        store.execute("INSERT INTO t (name) VALUES ('b')", &[]).unwrap();
        store.release("w").unwrap();
        assert_eq!(store.query("SELECT * FROM t", &[]).unwrap().len(), 1);
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_inserted_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.execute_batch("CREATE TABLE t (code TEXT PRIMARY KEY, serial INTEGER)").unwrap();
        store.execute("INSERT INTO t (code) VALUES (?1)", &[Value::from("A")]).unwrap();

        let row = store.inserted_row("t").unwrap().unwrap();
        assert_eq!(row["code"], Value::from("A"));
        assert_eq!(row["serial"], Value::Null);
    }
}
