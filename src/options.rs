//! Options consumed by find, realise, resolve and the write coordinator

use serde::{Deserialize, Serialize};

/// Where the lock property gets bumped on an optimistic write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// The engine writes `old + 1`
    #[default]
    Local,
    /// A store-side default or trigger bumps it; the engine only checks it
    Database,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Index attached record arrays by key-candidate string
    pub index_key: bool,
    /// Re-nest joined rows into a parent → children tree
    pub swizzle: bool,
    /// Raw SQL appended to the generated query, e.g. `ORDER BY "id"`
    pub append: Option<String>,
    /// Version column checked and bumped by updates
    pub lock_property: Option<String>,
    pub lock_mode: LockMode,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            index_key: false,
            swizzle: true,
            append: None,
            lock_property: None,
            lock_mode: LockMode::Local,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_key(mut self, index_key: bool) -> Self {
        self.index_key = index_key;
        self
    }

    pub fn swizzle(mut self, swizzle: bool) -> Self {
        self.swizzle = swizzle;
        self
    }

    pub fn append(mut self, clause: impl Into<String>) -> Self {
        self.append = Some(clause.into());
        self
    }

    pub fn lock(mut self, property: impl Into<String>, mode: LockMode) -> Self {
        self.lock_property = Some(property.into());
        self.lock_mode = mode;
        self
    }
}
