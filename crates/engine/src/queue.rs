// SPDX-License-Identifier: MIT

//! Pending-input queue with the Land's total order.

use land_core::{ItemPayload, PendingItem};
use std::collections::BTreeMap;

/// Inputs awaiting execution, ordered by `(resolved_at_tick, sequence)`.
#[derive(Debug, Default)]
pub struct PendingQueue {
    next_sequence: u64,
    items: BTreeMap<(u64, u64), PendingItem>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a payload for the given tick, assigning the next sequence.
    pub fn enqueue(&mut self, payload: ItemPayload, resolved_at_tick: u64) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let item = PendingItem { sequence, resolved_at_tick, payload };
        self.items.insert(item.order_key(), item);
        sequence
    }

    /// Re-enqueue a recorded item with its original sequence (replay).
    pub fn enqueue_recorded(&mut self, item: PendingItem) {
        self.next_sequence = self.next_sequence.max(item.sequence + 1);
        self.items.insert(item.order_key(), item);
    }

    /// Remove and return every item due at or before `tick`, in order.
    pub fn drain_due(&mut self, tick: u64) -> Vec<PendingItem> {
        let mut due = Vec::new();
        // BTreeMap keys iterate sorted, so the due prefix is contiguous.
        let keys: Vec<(u64, u64)> =
            self.items.range(..=(tick, u64::MAX)).map(|(key, _)| *key).collect();
        for key in keys {
            if let Some(item) = self.items.remove(&key) {
                due.push(item);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
