//! Engine - the entry point tying catalog, stores and records together
//!
//! Provides:
//! - Record construction with catalog/registry consistency checks
//! - find / create against the record's store
//! - Relationship walking (`realise`) and path resolution (`resolve`)
//! - Optimistic `update` / `delete`
//! - Transaction control per store

use std::sync::Arc;
use indexmap::IndexMap;
use crate::{Error, Result};
use crate::catalog::{SchemaCatalog, TableSchema};
use crate::graph::RelationshipWalker;
use crate::options::Options;
use crate::query::{self, CompiledQuery, RelationshipPath};
use crate::record::Record;
use crate::storage::{sql, Store, StoreRegistry, UpdatePolicy};
use crate::value::Value;
use crate::write::{OptimisticWriter, WriteOutcome};

/// Data-access engine over a catalog and its live stores
#[derive(Debug, Clone, Copy)]
pub struct Engine<'a> {
    catalog: &'a SchemaCatalog,
    stores: &'a StoreRegistry,
}

impl<'a> Engine<'a> {
    pub fn new(catalog: &'a SchemaCatalog, stores: &'a StoreRegistry) -> Self {
        Self { catalog, stores }
    }

    pub fn catalog(&self) -> &'a SchemaCatalog {
        self.catalog
    }

    pub fn stores(&self) -> &'a StoreRegistry {
        self.stores
    }

    /// Fail when generated metadata names stores the registry does not have
    fn check_sync(&self, table: &TableSchema) -> Result<()> {
        let missing: Vec<String> = table
            .compatible_store_ids()
            .filter(|id| !self.stores.contains(id))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::SchemaSyncMismatch {
                table: table.name().to_string(),
                missing,
            })
        }
    }

    /// Create an empty record for `table` in its default store
    pub fn record(&self, table: &str) -> Result<Record> {
        self.check_sync(self.catalog.table(table)?)?;
        Record::new(self.catalog, table)
    }

    /// Create an empty record for `table` in a specific store
    pub fn record_in(&self, table: &str, store_id: &str) -> Result<Record> {
        self.check_sync(self.catalog.table(table)?)?;
        Record::in_store(self.catalog, table, store_id)
    }

    /// Empty record of `table`, in `store_id` when the table lives there,
    /// otherwise in the table's default store
    pub(crate) fn prototype(&self, table: &str, store_id: &str) -> Result<Record> {
        let schema = self.catalog.table(table)?;
        let store_id = if schema.compatible_store_ids().any(|id| id == store_id) {
            store_id
        } else {
            schema.default_store_id()
        };
        Ok(Record::from_schema(Arc::clone(schema), store_id.to_string()))
    }

    pub fn store(&self, store_id: &str) -> Result<&'a dyn Store> {
        self.stores.get(store_id)
    }

    /// Rows of the prototype's table matching every property it has set
    pub fn find(&self, prototype: &Record, options: &Options) -> Result<Vec<Record>> {
        let store = self.store(prototype.store_id())?;
        let table_name = &prototype.store_schema()?.table_name;
        let stmt = sql::select(table_name, prototype.properties(), options.append.as_deref());

        store
            .query(&stmt.sql, &stmt.params)?
            .into_iter()
            .map(|row| Record::from_row(Arc::clone(prototype.schema()), prototype.store_id().to_string(), row))
            .collect()
    }

    /// First match of [`find`](Self::find)
    pub fn find_one(&self, prototype: &Record, options: &Options) -> Result<Option<Record>> {
        Ok(self.find(prototype, options)?.into_iter().next())
    }

    /// Insert the record's properties and mark it persisted.
    ///
    /// Sequenced columns the record leaves unset or null take what the
    /// store generated: the last insert id for the rowid key, and the
    /// re-read inserted row for every other sequence.
    pub fn create(&self, record: &mut Record) -> Result<()> {
        let store = self.store(record.store_id())?;
        let schema = record.store_schema()?;
        let stmt = sql::insert(&schema.table_name, record.properties());
        store.execute(&stmt.sql, &stmt.params)?;

        let rowid_column = schema.single_sequenced_primary();
        let unset: Vec<&String> = schema
            .sequences
            .keys()
            .filter(|column| record.properties().get(*column).is_none_or(Value::is_null))
            .collect();
        let inserted = if unset.iter().any(|column| Some(column.as_str()) != rowid_column) {
            store.inserted_row(&schema.table_name)?
        } else {
            None
        };

        let mut generated = IndexMap::new();
        for column in unset {
            let value = if Some(column.as_str()) == rowid_column {
                Value::Integer(store.last_insert_id()?)
            } else {
                inserted.as_ref().and_then(|row| row.get(column)).cloned().unwrap_or_default()
            };
            generated.insert(column.clone(), value);
        }

        tracing::debug!("Created {} in '{}' {:?}", record.table(), record.store_id(), generated);
        record.mark_persisted(generated);
        Ok(())
    }

    /// Populate relationships of `record` up to `hops` levels deep
    pub fn realise(&self, record: &mut Record, hops: usize, options: &Options) -> Result<()> {
        RelationshipWalker::new(*self).realise(record, hops, None, options)
    }

    /// Compile a relationship path against a seed record
    pub fn compile(&self, seed: &Record, path: &str, options: &Options) -> Result<CompiledQuery> {
        let path: RelationshipPath = path.parse()?;
        query::compile(self.catalog, &path, seed, options)
    }

    /// Run a relationship path as one joined query and nest the result
    pub fn resolve(&self, seed: &Record, path: &str, options: &Options) -> Result<Vec<Record>> {
        query::resolve(*self, seed, path, options)
    }

    /// Optimistic UPDATE of `old` with `new_properties`
    pub fn update<K, V>(
        &self,
        old: &mut Record,
        new_properties: impl IntoIterator<Item = (K, V)>,
        options: &Options,
    ) -> Result<WriteOutcome>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        OptimisticWriter::new(*self).update(old, new_properties, options)
    }

    /// Optimistic UPDATE carrying only the record's local changes
    pub fn save(&self, record: &mut Record, options: &Options) -> Result<WriteOutcome> {
        OptimisticWriter::new(*self).save(record, options)
    }

    /// Optimistic DELETE of `old`
    pub fn delete(&self, old: &mut Record, options: &Options) -> Result<WriteOutcome> {
        OptimisticWriter::new(*self).delete(old, options)
    }

    pub fn begin(&self, store_id: &str, policy: UpdatePolicy) -> Result<()> {
        self.store(store_id)?.begin(policy)
    }

    pub fn commit(&self, store_id: &str) -> Result<()> {
        self.store(store_id)?.commit()
    }

    pub fn rollback(&self, store_id: &str) -> Result<()> {
        self.store(store_id)?.rollback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StoreTableSchema;
    use crate::fixtures;
    use crate::storage::SqliteStore;

    #[test]
    fn test_find_by_properties() {
        let catalog = fixtures::catalog();
        let stores = fixtures::stores(&catalog);
        let engine = Engine::new(&catalog, &stores);

        let hills = engine.record("member").unwrap().with([("lastName", "Hill")]).unwrap();
        let found = engine.find(&hills, &Options::new().append("ORDER BY \"id\" DESC")).unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(Record::is_persisted));
        assert_eq!(found[0].get("firstName").unwrap(), Some(&Value::from("Jill")));
    }

    #[test]
    fn test_find_matches_null() {
        let catalog = fixtures::catalog();
        let stores = fixtures::stores(&catalog);
        let engine = Engine::new(&catalog, &stores);

        let top = engine.record("member").unwrap().with([("administratorId", Value::Null)]).unwrap();
        let found = engine.find_one(&top, &Options::default()).unwrap().unwrap();
        assert_eq!(found.get("id").unwrap(), Some(&Value::from(1)));
    }

    #[test]
    fn test_create_fills_sequence() {
        let catalog = fixtures::catalog();
        let stores = fixtures::stores(&catalog);
        let engine = Engine::new(&catalog, &stores);

        let mut club = engine.record("club").unwrap().with([("name", "Fencing")]).unwrap();
        engine.create(&mut club).unwrap();

        assert!(club.is_persisted());
        assert_eq!(club.get("id").unwrap(), Some(&Value::from(3)));

        let again = engine.record("club").unwrap().with([("id", 3)]).unwrap();
        assert_eq!(engine.find(&again, &Options::default()).unwrap().len(), 1);
    }

    fn ticket_catalog() -> SchemaCatalog {
        let ticket = StoreTableSchema::new("ticket")
            .column("code", "text")
            .column("serial", "integer")
            .sequence("serial", None)
            .primary_key("pk_ticket", &["code"]);
        let seat = StoreTableSchema::new("seat")
            .column("id", "integer")
            .column("section", "text")
            .column("serial", "integer")
            .sequence("id", None)
            .sequence("serial", None)
            .primary_key("pk_seat", &["id"]);
        SchemaCatalog::builder("main")
            .table("ticket", ticket)
            .table("seat", seat)
            .build()
            .unwrap()
    }

    fn ticket_stores(catalog: &SchemaCatalog) -> StoreRegistry {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize_schema(catalog).unwrap();
        StoreRegistry::new().with(store)
    }

    #[test]
    fn test_create_reads_back_non_rowid_sequence() {
        let catalog = ticket_catalog();
        let stores = ticket_stores(&catalog);
        let engine = Engine::new(&catalog, &stores);

        let mut a = engine.record("ticket").unwrap().with([("code", "A")]).unwrap();
        engine.create(&mut a).unwrap();
        let mut b = engine.record("ticket").unwrap().with([("code", "B")]).unwrap();
        engine.create(&mut b).unwrap();

        // The store generates nothing for serial, and the record agrees
        assert_eq!(a.get("serial").unwrap(), Some(&Value::Null));
        let stored = engine.find_one(&engine.record("ticket").unwrap().with([("code", "A")]).unwrap(), &Options::default())
            .unwrap()
            .unwrap();
        assert_eq!(stored.properties(), a.properties());

        let outcome = engine.update(&mut b, [("code", "C")], &Options::default()).unwrap();
        assert!(outcome.is_success());
    }

    #[test]
    fn test_create_fills_every_sequence() {
        let catalog = ticket_catalog();
        let stores = ticket_stores(&catalog);
        let engine = Engine::new(&catalog, &stores);

        let mut seat = engine.record("seat").unwrap().with([("section", "K")]).unwrap();
        engine.create(&mut seat).unwrap();
        assert_eq!(seat.get("id").unwrap(), Some(&Value::from(1)));
        assert_eq!(seat.get("serial").unwrap(), Some(&Value::Null));

        let outcome = engine.update(&mut seat, [("section", "L")], &Options::default()).unwrap();
        assert_eq!(outcome, WriteOutcome::Success(1));
    }

    #[test]
    fn test_create_surfaces_store_errors() {
        let catalog = fixtures::catalog();
        let stores = fixtures::stores(&catalog);
        let engine = Engine::new(&catalog, &stores);

        let mut duplicate = engine.record("club").unwrap().with([("name", "Chess")]).unwrap();
        assert!(matches!(engine.create(&mut duplicate), Err(Error::Store(_))));
        assert!(!duplicate.is_persisted());
    }

    #[test]
    fn test_schema_sync_mismatch() {
        let catalog = SchemaCatalog::builder("main")
            .table("member", fixtures::member_schema())
            .table_in("member", "archive", StoreTableSchema::new("member_archive").column("id", "integer"))
            .build()
            .unwrap();
        let stores = StoreRegistry::new().with(SqliteStore::open_in_memory().unwrap());
        let engine = Engine::new(&catalog, &stores);

        match engine.record("member") {
            Err(Error::SchemaSyncMismatch { table, missing }) => {
                assert_eq!(table, "member");
                assert_eq!(missing, vec!["archive".to_string()]);
            }
            other => panic!("expected sync mismatch, got {other:?}"),
        }
    }
}
