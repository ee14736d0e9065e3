// SPDX-License-Identifier: MIT

//! Patch units: canonical paths and delta operations.
//!
//! A patch is `(path, op, value?)`. Paths are produced by a deterministic
//! walk: map keys in sorted order, list indices in position order. The
//! canonical text form joins segments with '.' and is what the static
//! path-hash table is built from.

use crate::value::StateValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One component of a patch path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum PathSegment {
    /// Declared field name on a node.
    #[serde(rename = "f")]
    Field(String),
    /// Runtime-discovered mapping key (e.g. a PlayerId).
    #[serde(rename = "k")]
    Key(String),
    /// Position in an ordered sequence.
    #[serde(rename = "i")]
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{name}"),
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Sequence of segments from the root to one value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathSegment>);

impl Path {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![PathSegment::Field(name.into())])
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }

    /// Child path extended by one segment.
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every segment is a declared field name, the precondition
    /// for static path hashing.
    pub fn is_static(&self) -> bool {
        self.0.iter().all(|s| matches!(s, PathSegment::Field(_)))
    }

    /// Canonical dotted form, e.g. `inventories.alice.0`.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push_str(&segment.to_string());
        }
        out
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Delta operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Replace the value at the path (also used for changed list slots).
    Set,
    /// Remove the value at the path.
    Delete,
    /// Insert a new mapping entry.
    Add,
}

/// One delta unit against a projected tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub path: Path,
    pub op: PatchOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<StateValue>,
}

impl Patch {
    pub fn set(path: Path, value: StateValue) -> Self {
        Self { path, op: PatchOp::Set, value: Some(value) }
    }

    pub fn add(path: Path, value: StateValue) -> Self {
        Self { path, op: PatchOp::Add, value: Some(value) }
    }

    pub fn delete(path: Path) -> Self {
        Self { path, op: PatchOp::Delete, value: None }
    }
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod tests;
