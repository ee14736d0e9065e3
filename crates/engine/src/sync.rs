// SPDX-License-Identifier: MIT

//! Per-session synchronization: projection caches and diff production.
//!
//! The first sync for a session is a full projection; afterwards the
//! engine diffs the fresh projection against the session's cache and
//! replaces the cache with it. Applying the emitted patches to the cached
//! view reproduces the fresh projection byte for byte.

use land_core::{
    diff, project, DirtySet, NodeSchema, Patch, Recipient, SessionId, StateValue, Visibility,
};
use std::collections::{BTreeMap, HashMap};

/// One flush's output for a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    /// Full projection (first sync for this session).
    First(StateValue),
    /// Patches against the previous projection. May be empty (no-op).
    Diff(Vec<Patch>),
}

/// Output of a shared (broadcast-only) flush.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SharedFlush {
    /// The fresh shared projection (None when there are no sessions).
    pub projection: Option<StateValue>,
    /// One diff against the shared previous projection.
    pub patches: Vec<Patch>,
    /// Sessions that receive the shared diff.
    pub diff_targets: Vec<SessionId>,
    /// Sessions that still need their first full snapshot.
    pub first_targets: Vec<SessionId>,
}

struct SessionCache {
    recipient: Recipient,
    cache: Option<StateValue>,
}

/// Projection caches for every session bound to one Land.
#[derive(Default)]
pub struct SyncEngine {
    sessions: HashMap<SessionId, SessionCache>,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&mut self, recipient: Recipient) {
        self.sessions
            .insert(recipient.session_id, SessionCache { recipient, cache: None });
    }

    pub fn remove_session(&mut self, session_id: &SessionId) {
        self.sessions.remove(session_id);
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Project for one session and prime its cache (the firstSync path; the
    /// projection rides the JoinAck).
    pub fn first_sync(&mut self, session_id: &SessionId, root: &StateValue, schema: &NodeSchema) -> Option<StateValue> {
        let session = self.sessions.get_mut(session_id)?;
        let projection = project(root, schema, Visibility::Session(&session.recipient));
        session.cache = Some(projection.clone());
        Some(projection)
    }

    /// Diff one session against its cache and replace the cache.
    ///
    /// `dirty` short-circuits the walk: with field-level tracking enabled,
    /// untouched top-level fields are copied from the cache instead of
    /// being re-diffed. Output is identical either way.
    pub fn sync_session(
        &mut self,
        session_id: &SessionId,
        root: &StateValue,
        schema: &NodeSchema,
        dirty: &DirtySet,
    ) -> Option<SyncUpdate> {
        let session = self.sessions.get_mut(session_id)?;
        let projection = project(root, schema, Visibility::Session(&session.recipient));
        let update = match &session.cache {
            None => SyncUpdate::First(projection.clone()),
            Some(previous) => {
                let patches = match (dirty, previous.as_map(), projection.as_map()) {
                    (DirtySet::Fields(fields), Some(prev_map), Some(curr_map)) => {
                        diff_dirty_fields(prev_map, curr_map, fields)
                    }
                    _ => diff(previous, &projection),
                };
                SyncUpdate::Diff(patches)
            }
        };
        session.cache = Some(projection);
        Some(update)
    }

    /// Sessions currently registered, in no particular order.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Shared flush for broadcast-only lands: one projection, one diff.
    ///
    /// Relies on the keeper invariant that state only mutates inside a
    /// tick, so at flush time every primed cache holds the same previous
    /// projection. Sessions without a cache get the full projection; all
    /// caches are replaced with the fresh projection.
    pub fn flush_shared(
        &mut self,
        root: &StateValue,
        schema: &NodeSchema,
    ) -> SharedFlush {
        let mut flush = SharedFlush::default();
        let Some(any) = self.sessions.values().next() else { return flush };
        let projection = project(root, schema, Visibility::Session(&any.recipient));

        let previous = self.sessions.values().find_map(|s| s.cache.as_ref());
        flush.patches = previous.map(|prev| diff(prev, &projection)).unwrap_or_default();

        for (session_id, session) in &mut self.sessions {
            if session.cache.is_some() {
                flush.diff_targets.push(*session_id);
            } else {
                flush.first_targets.push(*session_id);
            }
            session.cache = Some(projection.clone());
        }
        flush.projection = Some(projection);
        flush
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Diff only the fields the recorder marked dirty. Fields outside the set
/// are unchanged by construction (single-writer tree), so skipping them is
/// purely an optimization.
fn diff_dirty_fields(
    prev: &BTreeMap<String, StateValue>,
    curr: &BTreeMap<String, StateValue>,
    dirty: &std::collections::BTreeSet<String>,
) -> Vec<Patch> {
    let mut narrowed_prev = BTreeMap::new();
    let mut narrowed_curr = BTreeMap::new();
    for field in dirty {
        if let Some(value) = prev.get(field) {
            narrowed_prev.insert(field.clone(), value.clone());
        }
        if let Some(value) = curr.get(field) {
            narrowed_curr.insert(field.clone(), value.clone());
        }
    }
    diff(
        &StateValue::Map(narrowed_prev),
        &StateValue::Map(narrowed_curr),
    )
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
