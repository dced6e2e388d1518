//! Table definitions generated from the catalog
//!
//! Used to create store tables matching the metadata, mainly for embedded
//! SQLite stores and tests.

use crate::Result;
use crate::storage::sql::quote_ident;
use super::SchemaCatalog;

/// SQL to create one table in `store_id`
pub fn create_table_sql(catalog: &SchemaCatalog, table: &str, store_id: &str) -> Result<String> {
    let schema = catalog.store_schema(table, store_id)?;

    // A lone sequenced integer primary key becomes the rowid alias
    let rowid_key = schema.single_sequenced_primary();

    let mut lines: Vec<String> = schema
        .columns
        .iter()
        .map(|(name, column)| {
            let mut line = format!("{} {}", quote_ident(name), column.data_type.to_uppercase());
            if rowid_key == Some(name.as_str()) {
                line.push_str(" PRIMARY KEY AUTOINCREMENT");
            } else if !column.nullable {
                line.push_str(" NOT NULL");
            }
            line
        })
        .collect();

    if rowid_key.is_none() {
        for key in schema.primary_keys.values() {
            lines.push(format!("PRIMARY KEY ({})", column_list(key.keys())));
        }
    }
    for key in schema.unique_keys.values() {
        lines.push(format!("UNIQUE ({})", column_list(key.keys())));
    }
    for key in schema.foreign_keys.values() {
        let Some(target) = key.values().next().map(|fc| fc.table.as_str()) else {
            continue;
        };
        let target_table = catalog.table(target)?.table_name(store_id)?;
        lines.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            column_list(key.keys()),
            quote_ident(target_table),
            column_list(key.values().map(|fc| &fc.column)),
        ));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(&schema.table_name),
        lines.join(",\n    ")
    ))
}

fn column_list<'a>(columns: impl Iterator<Item = &'a String>) -> String {
    columns.map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

/// All schema creation statements for one store
pub fn all_schema_statements(catalog: &SchemaCatalog, store_id: &str) -> Result<Vec<String>> {
    let mut stmts = Vec::new();
    for table in catalog.tables() {
        if table.compatible_store_ids().any(|id| id == store_id) {
            stmts.push(create_table_sql(catalog, table.name(), store_id)?);
        }
    }
    Ok(stmts)
}
