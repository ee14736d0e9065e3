// SPDX-License-Identifier: MIT

//! StateTree kernel: authoritative state for one Land.
//!
//! The tree is value-semantic: reads share an `Arc` snapshot, mutation goes
//! through an exclusive working copy (`StateDraft`) that replaces the root
//! atomically on commit. The hosting keeper serializes all mutation, so the
//! kernel assumes a single writer.
//!
//! The draft records which top-level fields were assigned. The sync engine
//! uses that to short-circuit unchanged fields during diffing; tracking is
//! an optimization only and disabling it yields identical output.

use crate::schema::{NodeSchema, SchemaError};
use crate::value::StateValue;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Immutable image of the tree at a tick boundary. Capture is O(1).
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tick_id: u64,
    pub root: Arc<StateValue>,
}

/// Which top-level fields changed since the last flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirtySet {
    /// Tracking disabled; callers must assume everything changed.
    Disabled,
    /// A whole-root mutation was taken; assume everything changed.
    All,
    /// Exactly these fields were assigned.
    Fields(BTreeSet<String>),
}

/// Exclusive working copy handed to a mutation closure.
///
/// The root is always a map; accessors below field granularity hand out
/// `&mut StateValue` and conservatively mark the field dirty.
pub struct StateDraft {
    root: BTreeMap<String, StateValue>,
    dirty: BTreeSet<String>,
    all_dirty: bool,
    track: bool,
}

impl StateDraft {
    pub fn get(&self, field: &str) -> Option<&StateValue> {
        self.root.get(field)
    }

    /// Assign a field, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<StateValue>) {
        let field = field.into();
        if self.track {
            self.dirty.insert(field.clone());
        }
        self.root.insert(field, value.into());
    }

    /// Remove a field entirely.
    pub fn remove(&mut self, field: &str) -> Option<StateValue> {
        if self.track {
            self.dirty.insert(field.to_string());
        }
        self.root.remove(field)
    }

    /// Mutable access to one field, inserting `Null` when absent.
    pub fn field_mut(&mut self, field: &str) -> &mut StateValue {
        if self.track {
            self.dirty.insert(field.to_string());
        }
        self.root.entry(field.to_string()).or_default()
    }

    /// Read-only view of the whole draft.
    pub fn root(&self) -> &BTreeMap<String, StateValue> {
        &self.root
    }

    /// Whole-root mutable access. Marks everything dirty.
    pub fn root_mut(&mut self) -> &mut BTreeMap<String, StateValue> {
        self.all_dirty = true;
        &mut self.root
    }
}

/// Authoritative state tree for one Land.
#[derive(Debug, Clone)]
pub struct StateTree {
    schema: Arc<NodeSchema>,
    root: Arc<StateValue>,
    tick_id: u64,
    dirty_tracking: bool,
    dirty: BTreeSet<String>,
    all_dirty: bool,
}

impl StateTree {
    /// Build a tree from an initial state, validating it against the schema.
    pub fn new(schema: Arc<NodeSchema>, initial: StateValue) -> Result<Self, SchemaError> {
        schema.check()?;
        schema.validate(&initial)?;
        Ok(Self {
            schema,
            root: Arc::new(initial),
            tick_id: 0,
            dirty_tracking: true,
            dirty: BTreeSet::new(),
            all_dirty: false,
        })
    }

    /// Toggle the dirty-field recorder (`LAND_ENABLE_DIRTY_TRACKING`).
    pub fn set_dirty_tracking(&mut self, enabled: bool) {
        self.dirty_tracking = enabled;
    }

    pub fn schema(&self) -> &Arc<NodeSchema> {
        &self.schema
    }

    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Advance the tick counter, returning the new tick id.
    pub fn advance_tick(&mut self) -> u64 {
        self.tick_id += 1;
        self.tick_id
    }

    /// O(1) image capture: shares the current root.
    pub fn current_snapshot(&self) -> Snapshot {
        Snapshot { tick_id: self.tick_id, root: Arc::clone(&self.root) }
    }

    /// Begin an exclusive working copy of the root.
    pub fn begin_draft(&self) -> StateDraft {
        let root = match self.root.as_ref() {
            StateValue::Map(map) => map.clone(),
            // Tree roots are validated to be maps at construction.
            _ => BTreeMap::new(),
        };
        StateDraft {
            root,
            dirty: BTreeSet::new(),
            all_dirty: false,
            track: self.dirty_tracking,
        }
    }

    /// Commit a draft: validate against the schema and swap the root.
    ///
    /// A validation failure here is an engine invariant violation; the
    /// caller (keeper) treats it as fatal for the Land.
    pub fn commit(&mut self, draft: StateDraft) -> Result<(), SchemaError> {
        let root = StateValue::Map(draft.root);
        self.schema.validate(&root)?;
        self.root = Arc::new(root);
        if self.dirty_tracking {
            if draft.all_dirty {
                self.all_dirty = true;
            }
            self.dirty.extend(draft.dirty);
        }
        Ok(())
    }

    /// Run a mutation closure against a working copy and commit on success.
    /// When the closure errors the draft is dropped and the tree is
    /// unchanged.
    pub fn try_mutate<T, E>(
        &mut self,
        f: impl FnOnce(&mut StateDraft) -> Result<T, E>,
    ) -> Result<Result<T, E>, SchemaError> {
        let mut draft = self.begin_draft();
        match f(&mut draft) {
            Ok(value) => {
                self.commit(draft)?;
                Ok(Ok(value))
            }
            Err(err) => Ok(Err(err)),
        }
    }

    /// Fields assigned since the last call. Resets the recorder.
    pub fn take_dirty(&mut self) -> DirtySet {
        if !self.dirty_tracking {
            return DirtySet::Disabled;
        }
        let all = std::mem::take(&mut self.all_dirty);
        let fields = std::mem::take(&mut self.dirty);
        if all {
            DirtySet::All
        } else {
            DirtySet::Fields(fields)
        }
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
