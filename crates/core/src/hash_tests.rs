// SPDX-License-Identifier: MIT

use super::*;
use crate::schema::{FieldSchema, FieldShape};

fn schema() -> NodeSchema {
    NodeSchema::new()
        .field("count", FieldSchema::broadcast(FieldShape::Scalar))
        .field("seed", FieldSchema::server_only(FieldShape::Scalar))
        .field("scratch", FieldSchema::internal(FieldShape::Scalar))
}

#[test]
fn hash_is_stable_for_equal_state() {
    let schema = schema();
    let a = StateValue::map([("count", 1i64), ("seed", 9i64)]);
    let b = StateValue::map([("seed", 9i64), ("count", 1i64)]);
    assert_eq!(state_hash(&a, &schema), state_hash(&b, &schema));
}

#[test]
fn hash_changes_with_tracked_state() {
    let schema = schema();
    let a = StateValue::map([("count", 1i64)]);
    let b = StateValue::map([("count", 2i64)]);
    assert_ne!(state_hash(&a, &schema), state_hash(&b, &schema));
}

#[test]
fn server_only_fields_are_hashed() {
    let schema = schema();
    let a = StateValue::map([("count", 1i64), ("seed", 1i64)]);
    let b = StateValue::map([("count", 1i64), ("seed", 2i64)]);
    assert_ne!(state_hash(&a, &schema), state_hash(&b, &schema));
}

#[test]
fn internal_fields_do_not_affect_the_hash() {
    let schema = schema();
    let a = StateValue::map([("count", 1i64), ("scratch", 1i64)]);
    let b = StateValue::map([("count", 1i64), ("scratch", 2i64)]);
    assert_eq!(state_hash(&a, &schema), state_hash(&b, &schema));
}

#[test]
fn hash_is_fixed_width_hex() {
    let digest = state_hash(&StateValue::map([("count", 0i64)]), &schema());
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
}
