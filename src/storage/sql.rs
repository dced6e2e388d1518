//! SQL text building
//!
//! Values are always bound as parameters (`?N`); only identifiers are
//! spliced into the statement text, and those are quoted.

use indexmap::IndexMap;
use crate::value::Value;

/// A statement and its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Qualified column reference `"alias"."column"`
pub fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quote_ident(alias), quote_ident(column))
}

/// Render `a = ?1 AND b IS NULL ...` for the given properties.
///
/// Placeholders are numbered from `params.len() + 1`, and the bound values
/// are appended to `params`. `alias` qualifies each column when given.
/// Returns `None` for an empty property set.
pub fn where_clause(properties: &IndexMap<String, Value>, alias: Option<&str>, params: &mut Vec<Value>) -> Option<String> {
    if properties.is_empty() {
        return None;
    }

    let conditions: Vec<String> = properties
        .iter()
        .map(|(column, value)| {
            let column = match alias {
                Some(alias) => qualified(alias, column),
                None => quote_ident(column),
            };
            if value.is_null() {
                format!("{} IS NULL", column)
            } else {
                params.push(value.clone());
                format!("{} = ?{}", column, params.len())
            }
        })
        .collect();

    Some(conditions.join(" AND "))
}

/// Append `WHERE <conditions>` and the caller's raw clause
pub(crate) fn push_tail(sql: &mut String, where_sql: Option<String>, append: Option<&str>) {
    if let Some(conditions) = where_sql {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions);
    }
    if let Some(append) = append.map(str::trim).filter(|a| !a.is_empty()) {
        sql.push(' ');
        sql.push_str(append);
    }
}

/// `SELECT * FROM table WHERE ... [append]`
pub fn select(table: &str, criteria: &IndexMap<String, Value>, append: Option<&str>) -> Statement {
    let mut params = Vec::new();
    let mut sql = format!("SELECT * FROM {}", quote_ident(table));
    let where_sql = where_clause(criteria, None, &mut params);
    push_tail(&mut sql, where_sql, append);
    Statement { sql, params }
}

/// `INSERT INTO table (...) VALUES (...)`
pub fn insert(table: &str, properties: &IndexMap<String, Value>) -> Statement {
    if properties.is_empty() {
        return Statement {
            sql: format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table)),
            params: Vec::new(),
        };
    }

    let columns: Vec<String> = properties.keys().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=properties.len()).map(|i| format!("?{}", i)).collect();
    Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders.join(", ")
        ),
        params: properties.values().cloned().collect(),
    }
}

/// `UPDATE table SET ... WHERE ...`
pub fn update(table: &str, assignments: &IndexMap<String, Value>, criteria: &IndexMap<String, Value>) -> Statement {
    let mut params: Vec<Value> = Vec::new();
    let sets: Vec<String> = assignments
        .iter()
        .map(|(column, value)| {
            params.push(value.clone());
            format!("{} = ?{}", quote_ident(column), params.len())
        })
        .collect();

    let mut sql = format!("UPDATE {} SET {}", quote_ident(table), sets.join(", "));
    let where_sql = where_clause(criteria, None, &mut params);
    push_tail(&mut sql, where_sql, None);
    Statement { sql, params }
}

/// `DELETE FROM table WHERE ...`
pub fn delete(table: &str, criteria: &IndexMap<String, Value>) -> Statement {
    let mut params = Vec::new();
    let mut sql = format!("DELETE FROM {}", quote_ident(table));
    let where_sql = where_clause(criteria, None, &mut params);
    push_tail(&mut sql, where_sql, None);
    Statement { sql, params }
}
