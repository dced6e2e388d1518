//! Schema catalog - generated per-table metadata
//!
//! Every table carries one [`StoreTableSchema`] per store it lives in, since
//! the same logical table may be shaped differently in different stores.
//! A store schema lists:
//! - columns and sequences (auto-generated columns)
//! - primary, unique and foreign keys
//! - foreign-key referees (the inverse view, declared on the parent side)
//! - key candidates, ordered by preference
//!
//! The catalog is read-only once built. Records hold an `Arc` of their
//! table's schema so they can validate property names without a global.

pub mod ddl;
pub mod loader;

use std::sync::Arc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use crate::{Error, Result};
use crate::value::Value;

pub use loader::load_catalog;

/// Key name → ordered column → sequenced flag
pub type KeySchema = IndexMap<String, IndexMap<String, bool>>;

/// Key name → ordered local column → referenced column
pub type ForeignKeySchema = IndexMap<String, IndexMap<String, ForeignColumn>>;

/// Build a relationship name: `<declaringTable>.<col1>.<col2>…`
pub fn relationship_name<'a>(declaring_table: &str, columns: impl IntoIterator<Item = &'a str>) -> String {
    let mut name = declaring_table.to_string();
    for column in columns {
        name.push('.');
        name.push_str(column);
    }
    name
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSchema {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            max_length: None,
            nullable: true,
        }
    }
}

/// The far end of one foreign-key column pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignColumn {
    pub table: String,
    pub column: String,
}

impl ForeignColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Preference tier of a key candidate. Variants are declared best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CandidateKind {
    PrimaryWithSequence,
    Primary,
    UniqueWithSequence,
    Sequence,
    Unique,
}

/// A column set able to identify a single row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCandidate {
    pub kind: CandidateKind,
    pub columns: Vec<String>,
}

/// Schema of one table within one store
#[derive(Debug, Clone, Default)]
pub struct StoreTableSchema {
    /// Physical table name in this store
    pub table_name: String,
    pub columns: IndexMap<String, ColumnSchema>,
    /// Auto-generated columns, with their sequence name when the store has one
    pub sequences: IndexMap<String, Option<String>>,
    pub primary_keys: KeySchema,
    pub unique_keys: KeySchema,
    pub foreign_keys: ForeignKeySchema,
    pub foreign_key_referees: ForeignKeySchema,
    pub key_candidates: Vec<KeyCandidate>,
}

impl StoreTableSchema {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn column(self, name: &str, data_type: &str) -> Self {
        self.column_with(name, ColumnSchema::new(data_type))
    }

    pub fn column_with(mut self, name: &str, column: ColumnSchema) -> Self {
        self.columns.insert(name.to_string(), column);
        self
    }

    pub fn sequence(mut self, column: &str, sequence_name: Option<&str>) -> Self {
        self.sequences.insert(column.to_string(), sequence_name.map(str::to_string));
        self
    }

    pub fn primary_key(mut self, name: &str, columns: &[&str]) -> Self {
        self.primary_keys.insert(name.to_string(), unsequenced(columns));
        self
    }

    pub fn unique_key(mut self, name: &str, columns: &[&str]) -> Self {
        self.unique_keys.insert(name.to_string(), unsequenced(columns));
        self
    }

    /// Declare a foreign key as `(local column, referenced table, referenced column)` triples
    pub fn foreign_key(mut self, name: &str, columns: &[(&str, &str, &str)]) -> Self {
        let key = columns
            .iter()
            .map(|(local, table, column)| (local.to_string(), ForeignColumn::new(*table, *column)))
            .collect();
        self.foreign_keys.insert(name.to_string(), key);
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Fail unless `column` exists and `value` fits its declared length.
    /// Text is measured in characters, blobs in bytes.
    pub fn check_value(&self, table: &str, column: &str, value: &Value) -> Result<()> {
        let Some(schema) = self.columns.get(column) else {
            return Err(Error::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        };
        let length = match value {
            Value::Text(text) => text.chars().count(),
            Value::Blob(bytes) => bytes.len(),
            _ => return Ok(()),
        };
        match schema.max_length {
            Some(max_length) if length > max_length as usize => Err(Error::ValueTooLong {
                table: table.to_string(),
                column: column.to_string(),
                max_length,
            }),
            _ => Ok(()),
        }
    }

    /// A lone sequenced integer primary key. SQLite stores it as the rowid
    /// alias, so its generated value is the last insert id.
    pub fn single_sequenced_primary(&self) -> Option<&str> {
        let mut keys = self.primary_keys.values();
        let key = keys.next()?;
        if keys.next().is_some() || key.len() != 1 {
            return None;
        }
        let (column, sequenced) = key.iter().next()?;
        let is_integer = self
            .columns
            .get(column)
            .is_some_and(|c| c.data_type.eq_ignore_ascii_case("integer"));
        (*sequenced && is_integer).then_some(column.as_str())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Foreign keys whose every column references `table`
    pub fn foreign_keys_to<'a>(&'a self, table: &'a str) -> impl Iterator<Item = (&'a str, &'a IndexMap<String, ForeignColumn>)> {
        self.foreign_keys
            .iter()
            .filter(move |(_, key)| key.values().all(|fc| fc.table == table))
            .map(|(name, key)| (name.as_str(), key))
    }

    /// Mark key columns that carry a sequence
    fn mark_sequenced(&mut self) {
        let sequences = &self.sequences;
        for key in self.primary_keys.values_mut().chain(self.unique_keys.values_mut()) {
            for (column, sequenced) in key.iter_mut() {
                *sequenced |= sequences.contains_key(column);
            }
        }
    }

    fn validate(&self, table: &str) -> Result<()> {
        let keys = self.primary_keys.values().chain(self.unique_keys.values());
        for column in keys.flat_map(|k| k.keys()).chain(self.sequences.keys()) {
            if !self.has_column(column) {
                return Err(Error::Catalog(format!("{} declares key on unknown column {}", table, column)));
            }
        }
        for (name, key) in &self.foreign_keys {
            if key.is_empty() {
                return Err(Error::Catalog(format!("foreign key {}.{} has no columns", table, name)));
            }
            for local in key.keys() {
                if !self.has_column(local) {
                    return Err(Error::Catalog(format!("foreign key {}.{} uses unknown column {}", table, name, local)));
                }
            }
        }
        Ok(())
    }
}

fn unsequenced(columns: &[&str]) -> IndexMap<String, bool> {
    columns.iter().map(|c| (c.to_string(), false)).collect()
}

/// Order key candidates by preference: primary with sequence, primary,
/// unique with sequence, lone sequences, unique.
pub fn derive_key_candidates(schema: &StoreTableSchema) -> Vec<KeyCandidate> {
    let mut candidates: Vec<KeyCandidate> = Vec::new();
    let mut push = |kind: CandidateKind, columns: Vec<String>| {
        if !candidates.iter().any(|c| c.columns == columns) {
            candidates.push(KeyCandidate { kind, columns });
        }
    };

    let has_sequence = |key: &IndexMap<String, bool>| key.values().any(|s| *s);
    let columns_of = |key: &IndexMap<String, bool>| key.keys().cloned().collect::<Vec<_>>();

    for key in schema.primary_keys.values().filter(|k| has_sequence(k)) {
        push(CandidateKind::PrimaryWithSequence, columns_of(key));
    }
    for key in schema.primary_keys.values().filter(|k| !has_sequence(k)) {
        push(CandidateKind::Primary, columns_of(key));
    }
    for key in schema.unique_keys.values().filter(|k| has_sequence(k)) {
        push(CandidateKind::UniqueWithSequence, columns_of(key));
    }
    for column in schema.sequences.keys() {
        push(CandidateKind::Sequence, vec![column.clone()]);
    }
    for key in schema.unique_keys.values().filter(|k| !has_sequence(k)) {
        push(CandidateKind::Unique, columns_of(key));
    }

    candidates
}

/// A logical table and its per-store schemas
#[derive(Debug)]
pub struct TableSchema {
    name: String,
    default_store_id: String,
    stores: IndexMap<String, StoreTableSchema>,
}

impl TableSchema {
    /// Logical table name, as used in relationship names and paths
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_store_id(&self) -> &str {
        &self.default_store_id
    }

    /// Store ids this table has generated metadata for
    pub fn compatible_store_ids(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn store(&self, store_id: &str) -> Result<&StoreTableSchema> {
        self.stores.get(store_id).ok_or_else(|| Error::UnknownStore {
            table: self.name.clone(),
            store_id: store_id.to_string(),
        })
    }

    pub fn table_name(&self, store_id: &str) -> Result<&str> {
        Ok(&self.store(store_id)?.table_name)
    }
}

/// All table schemas known to the application
#[derive(Debug)]
pub struct SchemaCatalog {
    default_store_id: String,
    tables: IndexMap<String, Arc<TableSchema>>,
}

impl SchemaCatalog {
    pub fn builder(default_store_id: impl Into<String>) -> CatalogBuilder {
        CatalogBuilder {
            default_store_id: default_store_id.into(),
            tables: IndexMap::new(),
        }
    }

    pub fn default_store_id(&self) -> &str {
        &self.default_store_id
    }

    pub fn table(&self, name: &str) -> Result<&Arc<TableSchema>> {
        self.tables.get(name).ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableSchema>> {
        self.tables.values()
    }

    /// Store schema for `table` in `store_id`
    pub fn store_schema(&self, table: &str, store_id: &str) -> Result<&StoreTableSchema> {
        self.table(table)?.store(store_id)
    }
}

/// Collects store schemas, then links them into a [`SchemaCatalog`]
#[derive(Debug)]
pub struct CatalogBuilder {
    default_store_id: String,
    tables: IndexMap<String, IndexMap<String, StoreTableSchema>>,
}

impl CatalogBuilder {
    /// Add a table's schema for the default store
    pub fn table(self, name: &str, schema: StoreTableSchema) -> Self {
        let store_id = self.default_store_id.clone();
        self.table_in(name, &store_id, schema)
    }

    /// Add a table's schema for a specific store
    pub fn table_in(mut self, name: &str, store_id: &str, schema: StoreTableSchema) -> Self {
        self.tables
            .entry(name.to_string())
            .or_default()
            .insert(store_id.to_string(), schema);
        self
    }

    /// Validate declarations, mark sequenced key columns, and derive
    /// referees and key candidates where the metadata omits them.
    pub fn build(mut self) -> Result<SchemaCatalog> {
        for (table, stores) in self.tables.iter_mut() {
            for schema in stores.values_mut() {
                schema.validate(table)?;
                schema.mark_sequenced();
                if schema.key_candidates.is_empty() {
                    schema.key_candidates = derive_key_candidates(schema);
                }
            }
        }

        // Referees are derived per store only where none were declared
        let mut derived: Vec<(String, String, String, IndexMap<String, ForeignColumn>)> = Vec::new();
        for (table, stores) in &self.tables {
            for (store_id, schema) in stores {
                for (key_name, key) in &schema.foreign_keys {
                    let mut target: Option<&str> = None;
                    let mut inverse = IndexMap::new();
                    for (local, foreign) in key {
                        let parent = self
                            .tables
                            .get(&foreign.table)
                            .and_then(|s| s.get(store_id))
                            .ok_or_else(|| Error::Catalog(format!(
                                "foreign key {}.{} references {} which has no schema for store '{}'",
                                table, key_name, foreign.table, store_id
                            )))?;
                        if !parent.has_column(&foreign.column) {
                            return Err(Error::Catalog(format!(
                                "foreign key {}.{} references unknown column {}.{}",
                                table, key_name, foreign.table, foreign.column
                            )));
                        }
                        if target.is_some_and(|t| t != foreign.table) {
                            return Err(Error::Catalog(format!(
                                "foreign key {}.{} spans more than one table", table, key_name
                            )));
                        }
                        target = Some(foreign.table.as_str());
                        inverse.insert(foreign.column.clone(), ForeignColumn::new(table.as_str(), local.as_str()));
                    }
                    if let Some(parent) = target {
                        derived.push((parent.to_string(), store_id.clone(), format!("{}.{}", table, key_name), inverse));
                    }
                }
            }
        }

        let declared: Vec<(String, String)> = self
            .tables
            .iter()
            .flat_map(|(table, stores)| {
                stores
                    .iter()
                    .filter(|(_, s)| !s.foreign_key_referees.is_empty())
                    .map(move |(store_id, _)| (table.clone(), store_id.clone()))
            })
            .collect();

        for (parent, store_id, key_name, inverse) in derived {
            if declared.iter().any(|(t, s)| *t == parent && *s == store_id) {
                continue;
            }
            if let Some(schema) = self.tables.get_mut(&parent).and_then(|s| s.get_mut(&store_id)) {
                schema.foreign_key_referees.entry(key_name).or_insert(inverse);
            }
        }

        let default_store_id = self.default_store_id;
        let tables = self
            .tables
            .into_iter()
            .map(|(name, stores)| {
                let table_default = if stores.contains_key(&default_store_id) {
                    default_store_id.clone()
                } else {
                    stores.keys().next().cloned().unwrap_or_else(|| default_store_id.clone())
                };
                let schema = TableSchema {
                    name: name.clone(),
                    default_store_id: table_default,
                    stores,
                };
                (name, Arc::new(schema))
            })
            .collect();

        Ok(SchemaCatalog { default_store_id, tables })
    }
}
