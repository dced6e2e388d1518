//! Path compilation into a single joined SELECT
//!
//! Each segment gets the alias `s{i}` and its columns are labelled
//! `"{i}.{column}"` so rows can be split back per segment. Seed properties
//! constrain the first segment.

use std::sync::Arc;
use crate::{Error, Result};
use crate::catalog::{relationship_name, SchemaCatalog, TableSchema};
use crate::options::Options;
use crate::query::path::{PathSegment, RelationshipPath};
use crate::record::Record;
use crate::storage::sql::{self, Statement};
use crate::storage::Row;

/// One table of a compiled path
#[derive(Debug, Clone)]
pub struct CompiledSegment {
    pub schema: Arc<TableSchema>,
    pub alias: String,
    /// Columns selected for this segment, in schema order
    pub columns: Vec<String>,
    /// `(previous segment column, this segment column)` pairs
    pub join: Vec<(String, String)>,
    /// Name under which this segment nests below the previous one when
    /// swizzling: the foreign-key declaring side of the join
    pub relation: Option<String>,
    /// Name used without swizzling: this segment as written
    pub literal_relation: Option<String>,
}

impl CompiledSegment {
    pub fn table(&self) -> &str {
        self.schema.name()
    }

    fn label(index: usize, column: &str) -> String {
        format!("{}.{}", index, column)
    }

    /// Pull this segment's columns out of a joined row
    pub(crate) fn split_row(&self, index: usize, row: &Row) -> Row {
        self.columns
            .iter()
            .filter_map(|c| row.get(&Self::label(index, c)).map(|v| (c.clone(), v.clone())))
            .collect()
    }
}

/// A path ready to run against one store
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub store_id: String,
    pub statement: Statement,
    pub segments: Vec<CompiledSegment>,
}

/// How two adjacent segments are joined
struct Join {
    left_columns: Vec<String>,
    relation: String,
}

/// Find the foreign key behind `left => right`, trying the side `right`
/// declares first.
///
/// When `left` is the first segment its written columns must match the
/// key. Otherwise they describe the join into `left`, and its side of this
/// join comes from the key itself.
fn resolve_join(
    catalog: &SchemaCatalog,
    store_id: &str,
    left: &PathSegment,
    left_is_first: bool,
    right: &PathSegment,
) -> Result<Join> {
    let right_schema = catalog.store_schema(&right.table, store_id)?;
    for (_, key) in right_schema.foreign_keys_to(&left.table) {
        let local: Vec<String> = key.keys().cloned().collect();
        let foreign: Vec<String> = key.values().map(|fc| fc.column.clone()).collect();
        if local == right.columns && (!left_is_first || foreign == left.columns) {
            return Ok(Join {
                left_columns: foreign,
                relation: relationship_name(&right.table, right.columns.iter().map(String::as_str)),
            });
        }
    }

    let left_schema = catalog.store_schema(&left.table, store_id)?;
    let matching: Vec<Vec<String>> = left_schema
        .foreign_keys_to(&right.table)
        .filter(|(_, key)| key.values().map(|fc| &fc.column).eq(right.columns.iter()))
        .map(|(_, key)| key.keys().cloned().collect())
        .collect();

    let chosen = if let Some(exact) = matching.iter().find(|local| **local == left.columns) {
        Some(exact.clone())
    } else if !left_is_first && matching.len() == 1 {
        matching.into_iter().next()
    } else if !left_is_first && matching.len() > 1 {
        return Err(Error::InvalidPath(format!(
            "{} references {} through more than one key", left.table, right
        )));
    } else {
        None
    };

    match chosen {
        Some(local) => {
            let relation = relationship_name(&left.table, local.iter().map(String::as_str));
            Ok(Join { left_columns: local, relation })
        }
        None => Err(Error::UnknownRelationship {
            from: left.to_string(),
            to: right.to_string(),
        }),
    }
}

/// Compile `path` into one SELECT seeded by `seed`'s properties
pub fn compile(catalog: &SchemaCatalog, path: &RelationshipPath, seed: &Record, options: &Options) -> Result<CompiledQuery> {
    let first = path
        .segments
        .first()
        .ok_or_else(|| Error::InvalidPath("path has no segments".to_string()))?;
    if first.table != seed.table() {
        return Err(Error::InvalidPath(format!(
            "path starts at {} but the seed record is {}", first.table, seed.table()
        )));
    }
    let store_id = seed.store_id();

    let mut segments: Vec<CompiledSegment> = Vec::with_capacity(path.segments.len());
    for (index, segment) in path.segments.iter().enumerate() {
        let schema = catalog.table(&segment.table)?;
        let store_schema = schema.store(store_id)?;
        for column in &segment.columns {
            if !store_schema.has_column(column) {
                return Err(Error::UnknownColumn {
                    table: segment.table.clone(),
                    column: column.clone(),
                });
            }
        }

        let (join, relation, literal_relation) = match index.checked_sub(1) {
            Some(previous) => {
                let resolved = resolve_join(catalog, store_id, &path.segments[previous], previous == 0, segment)?;
                let pairs = resolved.left_columns.into_iter().zip(segment.columns.iter().cloned()).collect();
                let literal = relationship_name(&segment.table, segment.columns.iter().map(String::as_str));
                (pairs, Some(resolved.relation), Some(literal))
            }
            None => (Vec::new(), None, None),
        };

        segments.push(CompiledSegment {
            schema: Arc::clone(schema),
            alias: format!("s{}", index),
            columns: store_schema.column_names().map(str::to_string).collect(),
            join,
            relation,
            literal_relation,
        });
    }

    let mut select_list = Vec::new();
    for (index, segment) in segments.iter().enumerate() {
        for column in &segment.columns {
            select_list.push(format!(
                "{} AS {}",
                sql::qualified(&segment.alias, column),
                sql::quote_ident(&CompiledSegment::label(index, column))
            ));
        }
    }

    let mut from = format!(
        "{} AS {}",
        sql::quote_ident(segments[0].schema.table_name(store_id)?),
        sql::quote_ident(&segments[0].alias)
    );
    for pair in segments.windows(2) {
        let (left, right) = (&pair[0], &pair[1]);
        let on: Vec<String> = right
            .join
            .iter()
            .map(|(l, r)| format!("{} = {}", sql::qualified(&left.alias, l), sql::qualified(&right.alias, r)))
            .collect();
        from.push_str(&format!(
            " JOIN {} AS {} ON {}",
            sql::quote_ident(right.schema.table_name(store_id)?),
            sql::quote_ident(&right.alias),
            on.join(" AND ")
        ));
    }

    let mut text = format!("SELECT {} FROM {}", select_list.join(", "), from);
    let mut params = Vec::new();
    let where_sql = sql::where_clause(seed.properties(), Some(&segments[0].alias), &mut params);
    sql::push_tail(&mut text, where_sql, options.append.as_deref());

    tracing::debug!("Compiled {} to: {}", path, text);

    Ok(CompiledQuery {
        store_id: store_id.to_string(),
        statement: Statement { sql: text, params },
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::value::Value;

    fn jack(catalog: &SchemaCatalog) -> Record {
        Record::new(catalog, "member").unwrap().with([("id", 1)]).unwrap()
    }

    fn compile_path(catalog: &SchemaCatalog, seed: &Record, path: &str) -> Result<CompiledQuery> {
        compile(catalog, &path.parse()?, seed, &Options::default())
    }

    #[test]
    fn test_compile_sql() {
        let catalog = fixtures::catalog();
        let compiled = compile_path(&catalog, &jack(&catalog), "member(id) => membership(memberId)").unwrap();

        let sql = &compiled.statement.sql;
        assert!(sql.starts_with("SELECT \"s0\".\"id\" AS \"0.id\""));
        assert!(sql.contains("FROM \"member\" AS \"s0\" JOIN \"membership\" AS \"s1\" ON \"s0\".\"id\" = \"s1\".\"memberId\""));
        assert!(sql.contains("WHERE \"s0\".\"id\" = ?1"));
        assert_eq!(compiled.statement.params, vec![Value::from(1)]);
        assert_eq!(compiled.segments.len(), 2);
    }

    #[test]
    fn test_three_table_chain() {
        let catalog = fixtures::catalog();
        let compiled = compile_path(&catalog, &jack(&catalog), "member(id) => membership(memberId) => club(id)").unwrap();

        let relations: Vec<_> = compiled.segments.iter().map(|s| s.relation.as_deref()).collect();
        assert_eq!(relations, vec![None, Some("membership.memberId"), Some("membership.clubId")]);
        assert_eq!(compiled.segments[2].literal_relation.as_deref(), Some("club.id"));
        assert_eq!(compiled.segments[2].join, vec![("clubId".to_string(), "id".to_string())]);
        assert!(compiled.statement.sql.contains("ON \"s1\".\"clubId\" = \"s2\".\"id\""));
    }

    #[test]
    fn test_reversed_path_keeps_declaring_name() {
        let catalog = fixtures::catalog();
        let membership = Record::new(&catalog, "membership").unwrap().with([("id", 1)]).unwrap();
        let compiled = compile_path(&catalog, &membership, "membership(memberId) => member(id)").unwrap();

        assert_eq!(compiled.segments[1].relation.as_deref(), Some("membership.memberId"));
        assert_eq!(compiled.segments[1].literal_relation.as_deref(), Some("member.id"));
    }

    #[test]
    fn test_self_reference() {
        let catalog = fixtures::catalog();
        let compiled = compile_path(&catalog, &jack(&catalog), "member(id) => member(administratorId)").unwrap();
        assert_eq!(compiled.segments[1].relation.as_deref(), Some("member.administratorId"));
        assert!(compiled.statement.sql.contains("ON \"s0\".\"id\" = \"s1\".\"administratorId\""));
    }

    #[test]
    fn test_compile_errors() {
        let catalog = fixtures::catalog();
        let seed = jack(&catalog);

        assert!(matches!(
            compile_path(&catalog, &seed, "member(firstName) => club(name)"),
            Err(Error::UnknownRelationship { .. })
        ));
        assert!(matches!(
            compile_path(&catalog, &seed, "member(version) => membership(memberId)"),
            Err(Error::UnknownRelationship { .. })
        ));
        assert!(matches!(
            compile_path(&catalog, &seed, "club(id) => membership(clubId)"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            compile_path(&catalog, &seed, "member(id) => membership(owner)"),
            Err(Error::UnknownColumn { .. })
        ));
        assert!(matches!(
            compile_path(&catalog, &seed, "member(id) => nope(id)"),
            Err(Error::UnknownTable(_))
        ));
    }
}
