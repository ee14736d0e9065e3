// SPDX-License-Identifier: MIT

//! Canonical state hashing.
//!
//! The hash is computed over the canonical JSON encoding of the
//! authoritative projection (everything except `internal` fields, slices
//! complete, masks not applied). Maps serialize in sorted key order, so the
//! same logical state produces the same bytes on every platform; replay
//! verification compares these digests tick by tick.

use crate::project::{project, Visibility};
use crate::schema::NodeSchema;
use crate::value::StateValue;
use sha2::{Digest, Sha256};

/// Canonical JSON encoding of a value. Key order is the map's sorted order.
pub fn canonical_json(value: &StateValue) -> String {
    // BTreeMap-backed maps make serde_json output canonical already.
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Hex Sha-256 of the canonical authoritative projection.
pub fn state_hash(root: &StateValue, schema: &NodeSchema) -> String {
    let authoritative = project(root, schema, Visibility::Authoritative);
    let canonical = canonical_json(&authoritative);
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
