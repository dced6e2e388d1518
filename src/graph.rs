//! Relationship Walker - eager population of related records
//!
//! Starting from one record, each hop looks at both views of the record's
//! foreign keys:
//! - keys the record declares (it holds the reference) attach the single
//!   referenced record
//! - referees (other tables pointing at it) attach every referencing record
//!
//! Both views name a relationship after the declaring table and its
//! columns, so the same edge has the same name from either end. That name
//! is what keeps the walk from bouncing straight back along the edge it
//! arrived on.

use std::sync::Arc;
use indexmap::IndexMap;
use crate::Result;
use crate::catalog::{relationship_name, ForeignColumn};
use crate::engine::Engine;
use crate::options::Options;
use crate::record::{Record, Related};
use crate::value::Value;

/// Attach `records` as a one-to-many relationship, keyed by each record's
/// key-candidate string when `index_key` is set. Records without a covered
/// candidate are keyed by position.
pub(crate) fn collect_related(records: Vec<Record>, index_key: bool) -> Result<Related> {
    if !index_key {
        return Ok(Related::Many(records));
    }
    let mut keyed = IndexMap::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        let key = record.key_string()?.unwrap_or_else(|| position.to_string());
        keyed.insert(key, record);
    }
    Ok(Related::Keyed(keyed))
}

/// Walks declared relationships outward from a record
pub struct RelationshipWalker<'a> {
    engine: Engine<'a>,
}

impl<'a> RelationshipWalker<'a> {
    pub fn new(engine: Engine<'a>) -> Self {
        Self { engine }
    }

    /// Attach related records to `record`, recursing `hops` levels deep.
    ///
    /// `incoming` is the relationship just traversed to reach `record`; it
    /// is never followed again from here. When a self-referencing key gives
    /// both views the same name, the referenced parent wins and the
    /// referencing records are only attached when there is no parent.
    pub fn realise(
        &self,
        record: &mut Record,
        hops: usize,
        incoming: Option<&str>,
        options: &Options,
    ) -> Result<()> {
        if hops == 0 {
            return Ok(());
        }

        let schema = Arc::clone(record.schema());
        let store_schema = schema.store(record.store_id())?;

        for (key_name, key) in &store_schema.foreign_keys {
            let relation = relationship_name(record.table(), key.keys().map(String::as_str));
            if incoming == Some(relation.as_str()) {
                continue;
            }
            let Some(lookup) = lookup_values(record, key) else {
                tracing::trace!("Skipping {} on {}: key not set", key_name, record.table());
                continue;
            };
            let Some(parent_table) = key.values().next().map(|fc| fc.table.as_str()) else {
                continue;
            };

            let Some(mut parent) = self.fetch(parent_table, record.store_id(), lookup)?.into_iter().next() else {
                continue;
            };
            if hops > 1 {
                self.realise(&mut parent, hops - 1, Some(&relation), options)?;
            }
            record.attach(relation, Related::One(Box::new(parent)));
        }

        for (key_name, key) in &store_schema.foreign_key_referees {
            let Some(child_table) = key.values().next().map(|fc| fc.table.as_str()) else {
                continue;
            };
            let relation = relationship_name(child_table, key.values().map(|fc| fc.column.as_str()));
            if incoming == Some(relation.as_str()) {
                continue;
            }
            // A self-referencing key yields the same name on both views;
            // the referenced parent attached above is kept.
            if record.related(&relation).is_some() {
                tracing::trace!("Skipping {} on {}: {} already attached", key_name, record.table(), relation);
                continue;
            }
            let Some(lookup) = lookup_values(record, key) else {
                tracing::trace!("Skipping {} on {}: key not set", key_name, record.table());
                continue;
            };

            let mut children = self.fetch(child_table, record.store_id(), lookup)?;
            if children.is_empty() {
                continue;
            }
            if hops > 1 {
                for child in children.iter_mut() {
                    self.realise(child, hops - 1, Some(&relation), options)?;
                }
            }
            record.attach(relation, collect_related(children, options.index_key)?);
        }

        Ok(())
    }

    fn fetch(&self, table: &str, store_id: &str, lookup: IndexMap<String, Value>) -> Result<Vec<Record>> {
        let prototype = self.engine.prototype(table, store_id)?.with(lookup)?;
        self.engine.find(&prototype, &Options::default())
    }
}

/// Map each local column's current value onto the far column.
/// `None` when any local value is unset or null.
fn lookup_values(record: &Record, key: &IndexMap<String, ForeignColumn>) -> Option<IndexMap<String, Value>> {
    key.iter()
        .map(|(local, far)| {
            record
                .properties()
                .get(local)
                .filter(|v| !v.is_null())
                .map(|v| (far.column.clone(), v.clone()))
        })
        .collect()
}
