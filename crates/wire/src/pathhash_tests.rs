// SPDX-License-Identifier: MIT

use super::*;
use land_core::{FieldSchema, FieldShape, NodeSchema};

fn schema() -> NodeSchema {
    let nested = NodeSchema::new()
        .field("hp", FieldSchema::broadcast(FieldShape::Scalar))
        .field("name", FieldSchema::broadcast(FieldShape::Scalar));
    NodeSchema::new()
        .field("count", FieldSchema::broadcast(FieldShape::Scalar))
        .field("boss", FieldSchema::broadcast(FieldShape::node(nested)))
        .field("inventories", FieldSchema::per_player(FieldShape::list_of(FieldShape::Scalar)))
}

#[test]
fn fnv1a32_known_vectors() {
    // Standard FNV-1a test vectors.
    assert_eq!(fnv1a32(""), 0x811c_9dc5);
    assert_eq!(fnv1a32("a"), 0xe40c_292c);
    assert_eq!(fnv1a32("foobar"), 0xbf9c_f968);
}

#[test]
fn from_schema_registers_static_paths_only() {
    let table = PathTable::from_schema(&schema()).unwrap();
    // count, boss, boss.hp, boss.name, inventories; map entries are not
    // static and register nothing below the field itself.
    assert_eq!(table.len(), 5);

    let count = Path::field("count");
    let hash = table.hash_of(&count).unwrap();
    assert_eq!(table.path_of(hash), Some(&count));

    let nested = Path::field("boss").child(PathSegment::Field("hp".to_string()));
    assert!(table.hash_of(&nested).is_some());
}

#[test]
fn dynamic_paths_have_no_hash() {
    let table = PathTable::from_schema(&schema()).unwrap();
    let dynamic = Path::field("inventories").child(PathSegment::Key("alice".to_string()));
    assert_eq!(table.hash_of(&dynamic), None);
}

#[test]
fn unregistered_static_paths_have_no_hash() {
    let table = PathTable::from_schema(&schema()).unwrap();
    assert_eq!(table.hash_of(&Path::field("ghost")), None);
}

#[test]
fn add_schema_merges_and_is_idempotent() {
    let mut table = PathTable::from_schema(&schema()).unwrap();
    let len = table.len();
    table.add_schema(&schema()).unwrap();
    assert_eq!(table.len(), len);

    let other = NodeSchema::new().field("phase", FieldSchema::broadcast(FieldShape::Scalar));
    table.add_schema(&other).unwrap();
    assert_eq!(table.len(), len + 1);
}
