//! Records - schema-validated property bags with dirty tracking
//!
//! A record belongs to one table in one store. Its properties are limited to
//! the columns that store declares; anything else goes through the explicit
//! `extra` side-channel. Relationship properties are attached only by the
//! graph walker and the join-path resolver.
//!
//! While a record is persisted, the first change to each property stores the
//! previous value in the dirty map. Entries stay until `reset_dirty` or
//! `reset`, so the original row can always be rebuilt for a WHERE clause.

use std::sync::Arc;
use indexmap::IndexMap;
use serde::Serialize;
use serde::ser::SerializeMap;
use crate::{Error, Result};
use crate::catalog::{SchemaCatalog, StoreTableSchema, TableSchema};
use crate::keys::KeyResolver;
use crate::storage::Row;
use crate::value::Value;

/// Records attached under a relationship name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Related {
    /// Many-to-one side: the single referenced record
    One(Box<Record>),
    /// One-to-many side, in store order
    Many(Vec<Record>),
    /// One-to-many side indexed by key-candidate string
    Keyed(IndexMap<String, Record>),
}

impl Related {
    pub fn len(&self) -> usize {
        match self {
            Related::One(_) => 1,
            Related::Many(records) => records.len(),
            Related::Keyed(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &Record> + '_> {
        match self {
            Related::One(record) => Box::new(std::iter::once(record.as_ref())),
            Related::Many(records) => Box::new(records.iter()),
            Related::Keyed(records) => Box::new(records.values()),
        }
    }

    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Related::One(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&[Record]> {
        match self {
            Related::Many(records) => Some(records),
            _ => None,
        }
    }

    pub fn as_keyed(&self) -> Option<&IndexMap<String, Record>> {
        match self {
            Related::Keyed(records) => Some(records),
            _ => None,
        }
    }
}

/// A row of one table, in memory
#[derive(Clone)]
pub struct Record {
    schema: Arc<TableSchema>,
    store_id: String,
    properties: IndexMap<String, Value>,
    extras: IndexMap<String, Value>,
    relations: IndexMap<String, Related>,
    /// Column → value before the first change since the last persist,
    /// `None` when the column was unset
    dirty: IndexMap<String, Option<Value>>,
    persisted: bool,
}

impl Record {
    /// Create an empty record for `table` in the table's default store
    pub fn new(catalog: &SchemaCatalog, table: &str) -> Result<Self> {
        let schema = catalog.table(table)?;
        let store_id = schema.default_store_id().to_string();
        Ok(Self::from_schema(Arc::clone(schema), store_id))
    }

    /// Create an empty record for `table` in a specific store
    pub fn in_store(catalog: &SchemaCatalog, table: &str, store_id: &str) -> Result<Self> {
        let schema = catalog.table(table)?;
        schema.store(store_id)?;
        Ok(Self::from_schema(Arc::clone(schema), store_id.to_string()))
    }

    /// Caller guarantees `store_id` is one of the table's stores
    pub(crate) fn from_schema(schema: Arc<TableSchema>, store_id: String) -> Self {
        Self {
            schema,
            store_id,
            properties: IndexMap::new(),
            extras: IndexMap::new(),
            relations: IndexMap::new(),
            dirty: IndexMap::new(),
            persisted: false,
        }
    }

    /// Build a persisted record from a result row.
    ///
    /// Columns the store schema does not declare land in the extras.
    pub(crate) fn from_row(schema: Arc<TableSchema>, store_id: String, row: Row) -> Result<Self> {
        let mut record = Self::from_schema(schema, store_id);
        let store_schema = record.schema.store(&record.store_id)?;
        let (properties, extras): (Vec<_>, Vec<_>) = row
            .into_iter()
            .partition(|(column, _)| store_schema.has_column(column));
        record.properties = properties.into_iter().collect();
        record.extras = extras.into_iter().collect();
        record.persisted = true;
        Ok(record)
    }

    /// Builder form of [`set`](Self::set)
    pub fn with<K, V>(mut self, properties: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.set(properties)?;
        Ok(self)
    }

    /// Logical table name
    pub fn table(&self) -> &str {
        self.schema.name()
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn store_schema(&self) -> Result<&StoreTableSchema> {
        self.schema.store(&self.store_id)
    }

    fn check_column(&self, name: &str) -> Result<()> {
        if self.store_schema()?.has_column(name) {
            Ok(())
        } else {
            Err(Error::UnknownColumn {
                table: self.table().to_string(),
                column: name.to_string(),
            })
        }
    }

    fn check_value(&self, name: &str, value: &Value) -> Result<()> {
        self.store_schema()?.check_value(self.table(), name, value)
    }

    /// Current value of a column, `None` when unset
    pub fn get(&self, name: &str) -> Result<Option<&Value>> {
        self.check_column(name)?;
        Ok(self.properties.get(name))
    }

    /// Set several columns at once and return their previous values
    /// (`Null` for columns that were unset).
    ///
    /// Every name and value is validated before anything is written.
    pub fn set<K, V>(&mut self, properties: impl IntoIterator<Item = (K, V)>) -> Result<IndexMap<String, Value>>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let properties: Vec<(String, Value)> = properties
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for (name, value) in &properties {
            self.check_value(name, value)?;
        }

        let mut previous = IndexMap::with_capacity(properties.len());
        for (name, value) in properties {
            let old = self.assign(name.clone(), value);
            previous.insert(name, old.unwrap_or_default());
        }
        Ok(previous)
    }

    /// Set one column and return its previous value
    pub fn set_one(&mut self, name: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        let value = value.into();
        self.check_value(name, &value)?;
        Ok(self.assign(name.to_string(), value))
    }

    fn assign(&mut self, name: String, value: Value) -> Option<Value> {
        let changed = self.properties.get(&name) != Some(&value);
        if self.persisted && changed && !self.dirty.contains_key(&name) {
            let original = self.properties.get(&name).cloned();
            self.dirty.insert(name.clone(), original);
        }
        self.properties.insert(name, value)
    }

    /// Schema properties in insertion order
    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub fn extra(&self, name: &str) -> Option<&Value> {
        self.extras.get(name)
    }

    /// Attach data that is not part of the schema
    pub fn set_extra(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.extras.insert(name.into(), value.into())
    }

    pub fn extras(&self) -> &IndexMap<String, Value> {
        &self.extras
    }

    pub fn related(&self, relation: &str) -> Option<&Related> {
        self.relations.get(relation)
    }

    pub fn relations(&self) -> &IndexMap<String, Related> {
        &self.relations
    }

    pub(crate) fn attach(&mut self, relation: String, related: Related) {
        self.relations.insert(relation, related);
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Original values of changed columns
    pub fn dirty(&self) -> &IndexMap<String, Option<Value>> {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Accept the current values as the persisted state
    pub fn reset_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Drop everything: properties, extras, relationships, dirty state
    pub fn reset(&mut self) {
        self.properties.clear();
        self.extras.clear();
        self.relations.clear();
        self.dirty.clear();
        self.persisted = false;
    }

    /// Properties as the store last saw them: current values with the
    /// dirty originals laid back over them.
    pub fn identity(&self) -> IndexMap<String, Value> {
        let mut identity = self.properties.clone();
        if self.persisted {
            for (name, original) in &self.dirty {
                match original {
                    Some(value) => identity.insert(name.clone(), value.clone()),
                    None => identity.shift_remove(name),
                };
            }
        }
        identity
    }

    /// Best identifying subset of the current properties
    pub fn key(&self) -> Result<IndexMap<String, Value>> {
        Ok(KeyResolver::new(&self.store_schema()?.key_candidates).resolve(&self.properties))
    }

    /// Rendered key-candidate string, `None` when no candidate is covered
    pub fn key_string(&self) -> Result<Option<String>> {
        Ok(KeyResolver::new(&self.store_schema()?.key_candidates).key_string(&self.properties))
    }

    /// Merge written values and mark the record as matching the store
    pub(crate) fn mark_persisted(&mut self, written: IndexMap<String, Value>) {
        self.properties.extend(written);
        self.dirty.clear();
        self.persisted = true;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.dirty.clear();
        self.persisted = false;
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.table() == other.table()
            && self.store_id == other.store_id
            && self.properties == other.properties
            && self.extras == other.extras
            && self.relations == other.relations
            && self.dirty == other.dirty
            && self.persisted == other.persisted
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.table())
            .field("store_id", &self.store_id)
            .field("properties", &self.properties)
            .field("extras", &self.extras)
            .field("relations", &self.relations)
            .field("dirty", &self.dirty)
            .field("persisted", &self.persisted)
            .finish()
    }
}

/// Serializes as one object: properties, then relationships
impl Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.properties.len() + self.relations.len()))?;
        for (name, value) in &self.properties {
            map.serialize_entry(name, value)?;
        }
        for (name, related) in &self.relations {
            map.serialize_entry(name, related)?;
        }
        map.end()
    }
}
