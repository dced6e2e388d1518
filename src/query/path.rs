//! Relationship path parsing
//!
//! A path is a chain of `table(col, ...)` segments joined by `=>`:
//!
//! ```text
//! member(id) => membership(memberId)
//! member(id) => membership(memberId) => club(id)
//! ```
//!
//! Each arrow is a foreign-key edge, in whichever direction the schema
//! declares it. A segment's columns are its side of the join with the
//! previous segment; the first segment's columns are its side of the join
//! with the second.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use regex::Regex;
use crate::{Error, Result};

pub const SEGMENT_SEPARATOR: &str = "=>";

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(([^()]*)\)\s*$").expect("valid segment pattern")
});

/// One `table(col, ...)` step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub table: String,
    pub columns: Vec<String>,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.table, self.columns.join(","))
    }
}

impl FromStr for PathSegment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = SEGMENT
            .captures(s)
            .ok_or_else(|| Error::InvalidPath(format!("malformed segment '{}'", s.trim())))?;
        let columns: Vec<String> = caps[2].split(',').map(|c| c.trim().to_string()).collect();
        if columns.iter().any(String::is_empty) {
            return Err(Error::InvalidPath(format!("empty column in segment '{}'", s.trim())));
        }
        Ok(Self {
            table: caps[1].to_string(),
            columns,
        })
    }
}

/// A parsed path; empty when the source string was blank
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipPath {
    pub segments: Vec<PathSegment>,
}

impl RelationshipPath {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Consecutive segment pairs, i.e. the joins
    pub fn joins(&self) -> impl Iterator<Item = (&PathSegment, &PathSegment)> {
        self.segments.iter().zip(self.segments.iter().skip(1))
    }
}

impl FromStr for RelationshipPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let segments = s
            .split(SEGMENT_SEPARATOR)
            .map(str::parse::<PathSegment>)
            .collect::<Result<Vec<PathSegment>>>()?;

        Ok(Self { segments })
    }
}

impl fmt::Display for RelationshipPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(&format!(" {} ", SEGMENT_SEPARATOR)))
    }
}
