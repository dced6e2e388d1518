//! Catalog file loading
//!
//! Generated metadata is shipped as a TOML document:
//!
//! ```toml
//! default_store = "main"
//!
//! [tables.member.stores.main]
//! table = "member"
//! columns = { id = { type = "integer", nullable = false }, firstName = { type = "text" } }
//! sequences = { id = "" }             # empty name = store-managed autoincrement
//! primary_keys = { pk_member = ["id"] }
//! foreign_keys = { fk_admin = { administratorId = "member.id" } }
//! ```
//!
//! Referees and key candidates may be given explicitly; when omitted they
//! are derived while the catalog is linked.

use std::path::Path;
use indexmap::IndexMap;
use serde::Deserialize;
use crate::{Error, Result};
use super::{CandidateKind, ColumnSchema, ForeignColumn, ForeignKeySchema, KeyCandidate, KeySchema, SchemaCatalog, StoreTableSchema};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    default_store: String,
    #[serde(default)]
    tables: IndexMap<String, TableFile>,
}

#[derive(Debug, Deserialize)]
struct TableFile {
    stores: IndexMap<String, StoreFile>,
}

#[derive(Debug, Deserialize)]
struct StoreFile {
    table: Option<String>,
    columns: IndexMap<String, ColumnSchema>,
    #[serde(default)]
    sequences: IndexMap<String, String>,
    #[serde(default)]
    primary_keys: IndexMap<String, Vec<String>>,
    #[serde(default)]
    unique_keys: IndexMap<String, Vec<String>>,
    #[serde(default)]
    foreign_keys: IndexMap<String, IndexMap<String, String>>,
    #[serde(default)]
    foreign_key_referees: IndexMap<String, IndexMap<String, String>>,
    #[serde(default)]
    key_candidates: Vec<Vec<String>>,
}

/// Load a catalog from a TOML file
pub fn load_catalog(path: &Path) -> Result<SchemaCatalog> {
    let contents = std::fs::read_to_string(path)?;
    parse_catalog(&contents)
}

/// Parse a catalog from TOML text
pub fn parse_catalog(contents: &str) -> Result<SchemaCatalog> {
    let file: CatalogFile = toml::from_str(contents).map_err(|e| Error::Catalog(e.to_string()))?;

    let mut builder = SchemaCatalog::builder(file.default_store);
    for (name, table) in file.tables {
        for (store_id, store) in table.stores {
            builder = builder.table_in(&name, &store_id, store.into_schema(&name)?);
        }
    }
    builder.build()
}

impl StoreFile {
    fn into_schema(self, logical_name: &str) -> Result<StoreTableSchema> {
        // Explicit candidates keep their file order; their tier is informational
        let key_candidates = self
            .key_candidates
            .into_iter()
            .map(|columns| KeyCandidate { kind: CandidateKind::Unique, columns })
            .collect();

        Ok(StoreTableSchema {
            table_name: self.table.unwrap_or_else(|| logical_name.to_string()),
            columns: self.columns,
            sequences: self
                .sequences
                .into_iter()
                .map(|(column, name)| (column, Some(name).filter(|n| !n.is_empty())))
                .collect(),
            primary_keys: key_schema(self.primary_keys),
            unique_keys: key_schema(self.unique_keys),
            foreign_keys: parse_foreign_keys(self.foreign_keys)?,
            foreign_key_referees: parse_foreign_keys(self.foreign_key_referees)?,
            key_candidates,
        })
    }
}

fn key_schema(keys: IndexMap<String, Vec<String>>) -> KeySchema {
    keys.into_iter()
        .map(|(name, columns)| (name, columns.into_iter().map(|c| (c, false)).collect()))
        .collect()
}

fn parse_foreign_keys(
    keys: IndexMap<String, IndexMap<String, String>>,
) -> Result<ForeignKeySchema> {
    keys.into_iter()
        .map(|(name, columns)| {
            let columns = columns
                .into_iter()
                .map(|(local, target)| {
                    let (table, column) = target.split_once('.').ok_or_else(|| {
                        Error::Catalog(format!("{}: reference '{}' must be table.column", name, target))
                    })?;
                    Ok((local, ForeignColumn::new(table, column)))
                })
                .collect::<Result<IndexMap<_, _>>>()?;
            Ok((name, columns))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"
default_store = "main"

[tables.member.stores.main]
table = "member"
columns = { id = { type = "integer", nullable = false }, firstName = { type = "text", max_length = 64 }, administratorId = { type = "integer" } }
sequences = { id = "" }
primary_keys = { pk_member = ["id"] }
foreign_keys = { fk_admin = { administratorId = "member.id" } }

[tables.member.stores.archive]
table = "member_archive"
columns = { id = { type = "integer" }, firstName = { type = "text" } }
unique_keys = { uq_name = ["firstName"] }
"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = parse_catalog(CATALOG).unwrap();
        let member = catalog.table("member").unwrap();

        assert_eq!(member.default_store_id(), "main");
        assert_eq!(member.compatible_store_ids().collect::<Vec<_>>(), vec!["main", "archive"]);
        assert_eq!(member.table_name("archive").unwrap(), "member_archive");

        let main = member.store("main").unwrap();
        assert_eq!(main.sequences.get("id"), Some(&None));
        assert_eq!(main.columns.get("firstName").unwrap().max_length, Some(64));
        assert_eq!(main.primary_keys["pk_member"]["id"], true);
        assert_eq!(main.key_candidates[0].columns, vec!["id".to_string()]);
        assert!(main.foreign_key_referees.contains_key("member.fk_admin"));

        let archive = member.store("archive").unwrap();
        assert_eq!(archive.key_candidates[0].kind, CandidateKind::Unique);
    }

    #[test]
    fn test_load_catalog_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let catalog = load_catalog(file.path()).unwrap();
        assert_eq!(catalog.default_store_id(), "main");
    }

    #[test]
    fn test_bad_reference() {
        let err = parse_catalog(r#"
default_store = "main"
[tables.a.stores.main]
columns = { b = { type = "integer" } }
foreign_keys = { fk = { b = "nodot" } }
"#).unwrap_err();
        assert!(matches!(err, Error::Catalog(_)));
    }
}
