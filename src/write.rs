//! Optimistic writes
//!
//! An UPDATE or DELETE matches the row by everything the record last saw
//! in the store, so a concurrent change makes it match nothing. The write
//! moves through three states:
//!
//! 1. `Initial`: the row identity is rebuilt from the dirty originals and
//!    local changes are folded into the assignments
//! 2. `LockPrepared`: the lock property, if any, is bumped
//! 3. `Executed`: the affected-row count decides the outcome
//!
//! Zero rows is [`WriteOutcome::Stale`], a normal result. More than one row
//! is [`Error::AmbiguousWrite`] unless the transaction allows multi-row
//! writes and no lock property is involved. A rejected write is rolled
//! back before the error is returned.

use indexmap::IndexMap;
use crate::{Error, Result};
use crate::engine::Engine;
use crate::options::{LockMode, Options};
use crate::record::Record;
use crate::storage::sql::{self, Statement};
use crate::storage::UpdatePolicy;
use crate::value::Value;

const WRITE_SAVEPOINT: &str = "relgraph_write";

/// Result of an optimistic write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Rows written
    Success(usize),
    /// The row no longer matches what the record last saw
    Stale,
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WriteOutcome::Success(_))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, WriteOutcome::Stale)
    }

    pub fn rows(&self) -> usize {
        match self {
            WriteOutcome::Success(rows) => *rows,
            WriteOutcome::Stale => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Update,
    Delete,
}

/// A write between `Initial` and `Executed`
#[derive(Debug)]
struct PreparedWrite {
    kind: WriteKind,
    table: String,
    table_name: String,
    identity: IndexMap<String, Value>,
    assignments: IndexMap<String, Value>,
    locked: bool,
}

impl PreparedWrite {
    /// Initial: identity and folded assignments
    fn new(kind: WriteKind, old: &Record, assignments: IndexMap<String, Value>, options: &Options) -> Result<Self> {
        let schema = old.store_schema()?;
        for (column, value) in &assignments {
            schema.check_value(old.table(), column, value)?;
        }
        if let Some(lock) = options.lock_property.as_deref() {
            if !schema.has_column(lock) {
                return Err(Error::UnknownColumn {
                    table: old.table().to_string(),
                    column: lock.to_string(),
                });
            }
        }

        let identity = old.identity();
        if identity.is_empty() {
            return Err(Error::MissingIdentity(old.table().to_string()));
        }

        let mut assignments = assignments;
        if kind == WriteKind::Update {
            for column in old.dirty().keys() {
                if !assignments.contains_key(column) {
                    let current = old.properties().get(column).cloned().unwrap_or_default();
                    assignments.insert(column.clone(), current);
                }
            }
        }

        Ok(Self {
            kind,
            table: old.table().to_string(),
            table_name: schema.table_name.clone(),
            identity,
            assignments,
            locked: options.lock_property.is_some(),
        })
    }

    /// LockPrepared: bump the version the store is expected to hold
    fn prepare_lock(mut self, options: &Options) -> Result<Self> {
        let Some(lock) = options.lock_property.as_deref() else {
            return Ok(self);
        };
        if self.kind == WriteKind::Delete || options.lock_mode == LockMode::Database {
            return Ok(self);
        }

        match self.identity.get(lock) {
            Some(current) if !current.is_null() => {
                let next = current
                    .incremented()
                    .ok_or_else(|| Error::InvalidLockValue(lock.to_string()))?;
                self.assignments.insert(lock.to_string(), next);
            }
            _ => tracing::debug!("Lock {}.{} has no value, not bumped", self.table, lock),
        }
        Ok(self)
    }

    fn statement(&self) -> Result<Statement> {
        match self.kind {
            WriteKind::Update if self.assignments.is_empty() => Err(Error::EmptyUpdate(self.table.clone())),
            WriteKind::Update => Ok(sql::update(&self.table_name, &self.assignments, &self.identity)),
            WriteKind::Delete => Ok(sql::delete(&self.table_name, &self.identity)),
        }
    }

    /// Executed: read the affected-row count
    fn verdict(&self, rows: usize, policy: UpdatePolicy) -> Result<WriteOutcome> {
        match rows {
            0 => {
                tracing::warn!("Stale {:?} on {}: no row matched {:?}", self.kind, self.table, self.identity);
                Ok(WriteOutcome::Stale)
            }
            1 => Ok(WriteOutcome::Success(1)),
            _ if self.locked || policy == UpdatePolicy::UniqueOnly => Err(Error::AmbiguousWrite {
                table: self.table.clone(),
                rows,
            }),
            _ => {
                tracing::debug!("{:?} on {} touched {} rows under {:?}", self.kind, self.table, rows, policy);
                Ok(WriteOutcome::Success(rows))
            }
        }
    }
}

/// Runs optimistic writes for an engine
pub struct OptimisticWriter<'a> {
    engine: Engine<'a>,
}

impl<'a> OptimisticWriter<'a> {
    pub fn new(engine: Engine<'a>) -> Self {
        Self { engine }
    }

    /// UPDATE the row `old` was read from with `new_properties` plus its
    /// own local changes. On success the record holds the written values.
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
        let assignments = new_properties
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let write = PreparedWrite::new(WriteKind::Update, old, assignments, options)?.prepare_lock(options)?;

        let outcome = self.execute(old.store_id(), &write)?;
        if outcome.is_success() {
            old.mark_persisted(write.assignments);
        }
        Ok(outcome)
    }

    /// Write back local changes only
    pub fn save(&self, record: &mut Record, options: &Options) -> Result<WriteOutcome> {
        self.update(record, std::iter::empty::<(String, Value)>(), options)
    }

    /// DELETE the row `old` was read from. On success the record is no
    /// longer persisted.
    pub fn delete(&self, old: &mut Record, options: &Options) -> Result<WriteOutcome> {
        let write = PreparedWrite::new(WriteKind::Delete, old, IndexMap::new(), options)?.prepare_lock(options)?;

        let outcome = self.execute(old.store_id(), &write)?;
        if outcome.is_success() {
            old.mark_deleted();
        }
        Ok(outcome)
    }

    /// Run the statement under a savepoint so a rejected verdict leaves
    /// the store as it was, with or without a caller transaction
    fn execute(&self, store_id: &str, write: &PreparedWrite) -> Result<WriteOutcome> {
        let store = self.engine.store(store_id)?;
        let stmt = write.statement()?;
        tracing::debug!("{:?} on {}: {}", write.kind, write.table, stmt.sql);

        store.savepoint(WRITE_SAVEPOINT)?;
        let verdict = store
            .execute(&stmt.sql, &stmt.params)
            .and_then(|rows| write.verdict(rows, store.update_policy()));
        if verdict.is_err() {
            store.rollback_to(WRITE_SAVEPOINT)?;
        }
        store.release(WRITE_SAVEPOINT)?;
        verdict
    }
}
