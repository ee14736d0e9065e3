// SPDX-License-Identifier: MIT

//! Static path hashing.
//!
//! Paths that are fully known at schema time (field segments only) are
//! replaced on the wire by a 32-bit FNV-1a hash of their canonical text.
//! Both ends build the same table from the same schema, once at startup;
//! it is read-only afterwards. Registration fails on hash collision rather
//! than silently corrupting paths.

use land_core::{FieldShape, NodeSchema, Path, PathSegment};
use std::collections::HashMap;
use thiserror::Error;

/// 32-bit FNV-1a over the canonical path text.
pub fn fnv1a32(s: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in s.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Errors from building the path table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathTableError {
    #[error("path hash collision: {a:?} and {b:?} both hash to {hash:#010x}")]
    Collision { a: String, b: String, hash: u32 },
}

/// Bidirectional map of static paths to their 32-bit hashes.
#[derive(Debug, Default, Clone)]
pub struct PathTable {
    by_hash: HashMap<u32, Path>,
    by_text: HashMap<String, u32>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate every static path of a schema and register it. Recurses
    /// into nested nodes; list and map shapes end the static prefix (their
    /// children are runtime-keyed).
    pub fn from_schema(schema: &NodeSchema) -> Result<Self, PathTableError> {
        let mut table = Self::new();
        table.add_schema(schema)?;
        Ok(table)
    }

    /// Register another schema into the same table (one table can serve a
    /// whole realm because registration is collision-checked).
    pub fn add_schema(&mut self, schema: &NodeSchema) -> Result<(), PathTableError> {
        collect_static_paths(schema, &Path::root(), &mut |path| self.register(path))
    }

    fn register(&mut self, path: &Path) -> Result<(), PathTableError> {
        let text = path.canonical();
        if self.by_text.contains_key(&text) {
            return Ok(());
        }
        let hash = fnv1a32(&text);
        if let Some(existing) = self.by_hash.get(&hash) {
            if existing.canonical() != text {
                return Err(PathTableError::Collision {
                    a: existing.canonical(),
                    b: text,
                    hash,
                });
            }
            return Ok(());
        }
        self.by_hash.insert(hash, path.clone());
        self.by_text.insert(text, hash);
        Ok(())
    }

    /// Hash for a path, if it is static and registered.
    pub fn hash_of(&self, path: &Path) -> Option<u32> {
        if !path.is_static() {
            return None;
        }
        self.by_text.get(&path.canonical()).copied()
    }

    /// Path for a hash received on the wire.
    pub fn path_of(&self, hash: u32) -> Option<&Path> {
        self.by_hash.get(&hash)
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

fn collect_static_paths(
    schema: &NodeSchema,
    prefix: &Path,
    register: &mut impl FnMut(&Path) -> Result<(), PathTableError>,
) -> Result<(), PathTableError> {
    for (name, field) in schema.fields() {
        let path = prefix.child(PathSegment::Field(name.to_string()));
        register(&path)?;
        if let FieldShape::Node(nested) = &field.shape {
            collect_static_paths(nested, &path, register)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "pathhash_tests.rs"]
mod tests;
