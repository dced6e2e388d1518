//! Re-nesting of flat joined rows
//!
//! Swizzled output is a parent → children tree: identical values of a
//! leading segment collapse into one record, and the following segment's
//! records hang under it by relationship name. Leaf rows are never
//! collapsed, so each joined row still contributes exactly one leaf.
//!
//! Unswizzled output keeps one chain per row, named as the path was written.

use std::sync::Arc;
use indexmap::IndexMap;
use indexmap::map::Entry;
use crate::{Error, Result};
use crate::graph::collect_related;
use crate::keys::KeyResolver;
use crate::query::compiler::{CompiledQuery, CompiledSegment};
use crate::record::{Record, Related};
use crate::storage::Row;
use crate::value::Value;

fn split_rows(query: &CompiledQuery, rows: &[Row]) -> Vec<Vec<Row>> {
    rows.iter()
        .map(|row| {
            query
                .segments
                .iter()
                .enumerate()
                .map(|(index, segment)| segment.split_row(index, row))
                .collect()
        })
        .collect()
}

fn build(query: &CompiledQuery, segment: &CompiledSegment, row: &Row) -> Result<Record> {
    Record::from_row(Arc::clone(&segment.schema), query.store_id.clone(), row.clone())
}

fn relation_below(segment: &CompiledSegment, literal: bool) -> String {
    let name = if literal { &segment.literal_relation } else { &segment.relation };
    name.clone().unwrap_or_else(|| segment.table().to_string())
}

/// Key string of a segment row, `None` when no candidate is covered or
/// a key column is null
fn group_key(resolver: &KeyResolver<'_>, row: &Row) -> Option<String> {
    let key = resolver.resolve(row);
    if key.is_empty() || key.values().any(Value::is_null) {
        return None;
    }
    resolver.key_string(row)
}

/// Nest rows into a tree rooted at the first segment
pub fn swizzle(query: &CompiledQuery, rows: &[Row], index_key: bool) -> Result<Vec<Record>> {
    let split = split_rows(query, rows);
    let views: Vec<&[Row]> = split.iter().map(Vec::as_slice).collect();
    nest(query, &views, 0, index_key)
}

fn nest(query: &CompiledQuery, rows: &[&[Row]], depth: usize, index_key: bool) -> Result<Vec<Record>> {
    let segment = &query.segments[depth];
    let Some(next) = query.segments.get(depth + 1) else {
        return rows.iter().map(|row| build(query, segment, &row[depth])).collect();
    };

    let resolver = KeyResolver::new(&segment.schema.store(&query.store_id)?.key_candidates);
    let mut groups: Vec<(&Row, Vec<&[Row]>)> = Vec::new();
    let mut by_key: IndexMap<String, usize> = IndexMap::new();
    for row in rows {
        let head = &row[depth];
        let existing = match group_key(&resolver, head) {
            Some(key) => match by_key.entry(key) {
                Entry::Occupied(entry) => Some(*entry.get()),
                Entry::Vacant(entry) => {
                    entry.insert(groups.len());
                    None
                }
            },
            // Without a usable key, rows collapse only when fully equal
            None => groups.iter().position(|(other, _)| *other == head),
        };
        match existing {
            Some(index) => groups[index].1.push(*row),
            None => groups.push((head, vec![*row])),
        }
    }

    let relation = relation_below(next, false);
    groups
        .into_iter()
        .map(|(head, members)| {
            let mut record = build(query, segment, head)?;
            let children = nest(query, &members, depth + 1, index_key)?;
            record.attach(relation.clone(), collect_related(children, index_key)?);
            Ok(record)
        })
        .collect()
}

/// One record chain per row, linked by the literal segment names
pub fn chain(query: &CompiledQuery, rows: &[Row]) -> Result<Vec<Record>> {
    split_rows(query, rows)
        .into_iter()
        .map(|row| {
            let mut below: Option<Record> = None;
            for (depth, segment) in query.segments.iter().enumerate().rev() {
                let mut record = build(query, segment, &row[depth])?;
                if let (Some(child), Some(next)) = (below.take(), query.segments.get(depth + 1)) {
                    record.attach(relation_below(next, true), Related::One(Box::new(child)));
                }
                below = Some(record);
            }
            below.ok_or_else(|| Error::InvalidPath("path has no segments".to_string()))
        })
        .collect()
}
