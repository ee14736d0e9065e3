// SPDX-License-Identifier: MIT

//! Path-based diff between two projected trees, and patch application.
//!
//! The diff walks previous and current projections in lockstep. Terminals
//! compare by equality; mappings iterate the union of keys in sorted order
//! (`add` for new keys, `delete` for removed, recurse for both-present);
//! sequences compare index-aligned with `set`/`delete` at the tail for
//! length changes. No common-subsequence optimization; simplicity is the
//! design choice.
//!
//! Patches are emitted in pre-order by canonical path and must be applied
//! in order. Tail deletions are emitted highest-index-first so removal by
//! index stays valid while applying.

use crate::patch::{Patch, PatchOp, Path, PathSegment};
use crate::value::StateValue;
use thiserror::Error;

/// Compute the patch stream that transforms `prev` into `curr`.
pub fn diff(prev: &StateValue, curr: &StateValue) -> Vec<Patch> {
    let mut patches = Vec::new();
    diff_value(&Path::root(), prev, curr, &mut patches);
    patches
}

fn diff_value(path: &Path, prev: &StateValue, curr: &StateValue, out: &mut Vec<Patch>) {
    match (prev, curr) {
        (StateValue::Map(prev_map), StateValue::Map(curr_map)) => {
            // Union of keys in sorted order. Both maps are BTreeMaps, so a
            // merged walk stays sorted without collecting.
            let mut prev_iter = prev_map.iter().peekable();
            let mut curr_iter = curr_map.iter().peekable();
            loop {
                match (prev_iter.peek(), curr_iter.peek()) {
                    (Some((pk, pv)), Some((ck, cv))) => {
                        if pk == ck {
                            let child = path.child(segment_for_key(path, pk));
                            diff_value(&child, pv, cv, out);
                            prev_iter.next();
                            curr_iter.next();
                        } else if pk < ck {
                            out.push(Patch::delete(path.child(segment_for_key(path, pk))));
                            prev_iter.next();
                        } else {
                            out.push(Patch::add(
                                path.child(segment_for_key(path, ck)),
                                (*cv).clone(),
                            ));
                            curr_iter.next();
                        }
                    }
                    (Some((pk, _)), None) => {
                        out.push(Patch::delete(path.child(segment_for_key(path, pk))));
                        prev_iter.next();
                    }
                    (None, Some((ck, cv))) => {
                        out.push(Patch::add(
                            path.child(segment_for_key(path, ck)),
                            (*cv).clone(),
                        ));
                        curr_iter.next();
                    }
                    (None, None) => break,
                }
            }
        }
        (StateValue::List(prev_items), StateValue::List(curr_items)) => {
            let shared = prev_items.len().min(curr_items.len());
            for index in 0..shared {
                let child = path.child(PathSegment::Index(index));
                diff_value(&child, &prev_items[index], &curr_items[index], out);
            }
            // Growth: set at the new tail indices.
            for (index, item) in curr_items.iter().enumerate().skip(shared) {
                out.push(Patch::set(path.child(PathSegment::Index(index)), item.clone()));
            }
            // Shrink: delete from the old tail downward so indices stay
            // valid during application.
            for index in (shared..prev_items.len()).rev() {
                out.push(Patch::delete(path.child(PathSegment::Index(index))));
            }
        }
        (prev, curr) => {
            if prev != curr {
                out.push(Patch::set(path.clone(), curr.clone()));
            }
        }
    }
}

/// Top-level map keys are declared fields; keys below the root are
/// runtime-discovered mapping keys.
fn segment_for_key(path: &Path, key: &str) -> PathSegment {
    if path.is_root() {
        PathSegment::Field(key.to_string())
    } else {
        PathSegment::Key(key.to_string())
    }
}

/// Errors from applying a patch stream.
#[derive(Debug, Error, PartialEq)]
pub enum ApplyError {
    #[error("patch path not found: {0}")]
    PathNotFound(String),

    #[error("patch path {0} traverses a terminal value")]
    NotAContainer(String),

    #[error("list index {index} out of bounds at {path}")]
    IndexOutOfBounds { path: String, index: usize },

    #[error("set/add patch at {0} is missing its value")]
    MissingValue(String),
}

/// Apply patches in order to a target tree.
///
/// Applying the diff of `(prev, curr)` to `prev` yields `curr` exactly;
/// this is the projection-completeness property the sync engine relies on.
pub fn apply_patches(target: &mut StateValue, patches: &[Patch]) -> Result<(), ApplyError> {
    for patch in patches {
        apply_one(target, patch)?;
    }
    Ok(())
}

fn apply_one(target: &mut StateValue, patch: &Patch) -> Result<(), ApplyError> {
    let segments = patch.path.segments();
    let Some((last, parents)) = segments.split_last() else {
        // Root-level set replaces the whole tree.
        return match patch.op {
            PatchOp::Set | PatchOp::Add => {
                let value = patch
                    .value
                    .clone()
                    .ok_or_else(|| ApplyError::MissingValue(patch.path.canonical()))?;
                *target = value;
                Ok(())
            }
            PatchOp::Delete => {
                *target = StateValue::Map(Default::default());
                Ok(())
            }
        };
    };

    let mut node = target;
    for segment in parents {
        node = descend(node, segment, &patch.path)?;
    }

    match (&patch.op, last) {
        (PatchOp::Set | PatchOp::Add, PathSegment::Field(name) | PathSegment::Key(name)) => {
            let value = patch
                .value
                .clone()
                .ok_or_else(|| ApplyError::MissingValue(patch.path.canonical()))?;
            let map = node
                .as_map_mut()
                .ok_or_else(|| ApplyError::NotAContainer(patch.path.canonical()))?;
            map.insert(name.clone(), value);
            Ok(())
        }
        (PatchOp::Set | PatchOp::Add, PathSegment::Index(index)) => {
            let value = patch
                .value
                .clone()
                .ok_or_else(|| ApplyError::MissingValue(patch.path.canonical()))?;
            let items = node
                .as_list_mut()
                .ok_or_else(|| ApplyError::NotAContainer(patch.path.canonical()))?;
            if *index < items.len() {
                items[*index] = value;
            } else if *index == items.len() {
                items.push(value);
            } else {
                return Err(ApplyError::IndexOutOfBounds {
                    path: patch.path.canonical(),
                    index: *index,
                });
            }
            Ok(())
        }
        (PatchOp::Delete, PathSegment::Field(name) | PathSegment::Key(name)) => {
            let map = node
                .as_map_mut()
                .ok_or_else(|| ApplyError::NotAContainer(patch.path.canonical()))?;
            map.remove(name)
                .map(|_| ())
                .ok_or_else(|| ApplyError::PathNotFound(patch.path.canonical()))
        }
        (PatchOp::Delete, PathSegment::Index(index)) => {
            let items = node
                .as_list_mut()
                .ok_or_else(|| ApplyError::NotAContainer(patch.path.canonical()))?;
            if *index >= items.len() {
                return Err(ApplyError::IndexOutOfBounds {
                    path: patch.path.canonical(),
                    index: *index,
                });
            }
            items.remove(*index);
            Ok(())
        }
    }
}

fn descend<'a>(
    node: &'a mut StateValue,
    segment: &PathSegment,
    path: &Path,
) -> Result<&'a mut StateValue, ApplyError> {
    match segment {
        PathSegment::Field(name) | PathSegment::Key(name) => node
            .as_map_mut()
            .ok_or_else(|| ApplyError::NotAContainer(path.canonical()))?
            .get_mut(name)
            .ok_or_else(|| ApplyError::PathNotFound(path.canonical())),
        PathSegment::Index(index) => node
            .as_list_mut()
            .ok_or_else(|| ApplyError::NotAContainer(path.canonical()))?
            .get_mut(*index)
            .ok_or(ApplyError::IndexOutOfBounds { path: path.canonical(), index: *index }),
    }
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
