//! Join-path resolution
//!
//! A relationship path such as `member(id) => membership(memberId)` is
//! compiled into one joined SELECT, run against the seed record's store,
//! and the flat rows are nested back into records.

pub mod compiler;
pub mod path;
pub mod swizzle;

pub use compiler::{compile, CompiledQuery, CompiledSegment};
pub use path::{PathSegment, RelationshipPath};

use crate::Result;
use crate::engine::Engine;
use crate::options::Options;
use crate::record::Record;

/// Resolve `path` from `seed`. A blank path is a plain find on the seed.
pub fn resolve(engine: Engine<'_>, seed: &Record, path: &str, options: &Options) -> Result<Vec<Record>> {
    let path: RelationshipPath = path.parse()?;
    if path.is_empty() {
        return engine.find(seed, options);
    }

    let compiled = compile(engine.catalog(), &path, seed, options)?;
    let store = engine.store(&compiled.store_id)?;
    let rows = store.query(&compiled.statement.sql, &compiled.statement.params)?;
    tracing::debug!("Resolved {} into {} rows", path, rows.len());

    if options.swizzle {
        swizzle::swizzle(&compiled, &rows, options.index_key)
    } else {
        swizzle::chain(&compiled, &rows)
    }
}
