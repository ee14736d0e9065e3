// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn canonical_joins_segments_with_dots() {
    let mut path = Path::field("inventories");
    path.push(PathSegment::Key("alice".to_string()));
    path.push(PathSegment::Index(0));
    assert_eq!(path.canonical(), "inventories.alice.0");
    assert_eq!(path.to_string(), "inventories.alice.0");
}

#[test]
fn root_path_is_empty() {
    let path = Path::root();
    assert!(path.is_root());
    assert_eq!(path.canonical(), "");
}

#[test]
fn static_detection() {
    let static_path = Path::field("scores").child(PathSegment::Field("total".to_string()));
    assert!(static_path.is_static());

    let dynamic = Path::field("scores").child(PathSegment::Key("alice".to_string()));
    assert!(!dynamic.is_static());

    let indexed = Path::field("items").child(PathSegment::Index(1));
    assert!(!indexed.is_static());
}

#[test]
fn child_does_not_mutate_parent() {
    let parent = Path::field("a");
    let child = parent.child(PathSegment::Field("b".to_string()));
    assert_eq!(parent.canonical(), "a");
    assert_eq!(child.canonical(), "a.b");
}

#[test]
fn patch_constructors_set_op_and_value() {
    let set = Patch::set(Path::field("count"), StateValue::Int(1));
    assert_eq!(set.op, PatchOp::Set);
    assert_eq!(set.value, Some(StateValue::Int(1)));

    let delete = Patch::delete(Path::field("count"));
    assert_eq!(delete.op, PatchOp::Delete);
    assert!(delete.value.is_none());
}

#[test]
fn patch_serde_roundtrip() {
    let patch = Patch::add(
        Path::field("inventories").child(PathSegment::Key("bob".to_string())),
        StateValue::list(["bow"]),
    );
    let json = serde_json::to_string(&patch).unwrap();
    let back: Patch = serde_json::from_str(&json).unwrap();
    assert_eq!(back, patch);
}

#[test]
fn delete_serde_omits_value() {
    let json = serde_json::to_value(Patch::delete(Path::field("x"))).unwrap();
    assert!(json.get("value").is_none());
}
