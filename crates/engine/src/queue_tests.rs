// SPDX-License-Identifier: MIT

use super::*;
use land_core::{Lifecycle, PlayerId, SessionId, StateValue};

fn event(name: &str) -> ItemPayload {
    ItemPayload::ClientEvent {
        session_id: SessionId::from_string("ses-q"),
        player_id: PlayerId::new("alice"),
        type_id: name.to_string(),
        payload: StateValue::Null,
    }
}

#[test]
fn sequences_are_monotonic() {
    let mut queue = PendingQueue::new();
    assert_eq!(queue.enqueue(event("a"), 1), 0);
    assert_eq!(queue.enqueue(event("b"), 1), 1);
    assert_eq!(queue.enqueue(event("c"), 2), 2);
}

#[test]
fn drain_due_returns_items_in_total_order() {
    let mut queue = PendingQueue::new();
    queue.enqueue(event("late"), 3);
    queue.enqueue(event("first"), 1);
    queue.enqueue(event("second"), 1);

    let due = queue.drain_due(2);
    let names: Vec<&str> = due.iter().filter_map(|i| i.payload.type_id()).collect();
    assert_eq!(names, ["first", "second"]);
    assert_eq!(queue.len(), 1);

    let rest = queue.drain_due(3);
    assert_eq!(rest.len(), 1);
    assert!(queue.is_empty());
}

#[test]
fn drain_due_on_empty_queue_is_empty() {
    let mut queue = PendingQueue::new();
    assert!(queue.drain_due(10).is_empty());
}

#[test]
fn future_items_stay_queued() {
    let mut queue = PendingQueue::new();
    queue.enqueue(event("later"), 5);
    assert!(queue.drain_due(4).is_empty());
    assert_eq!(queue.len(), 1);
}

#[test]
fn recorded_items_keep_their_sequence() {
    let mut queue = PendingQueue::new();
    queue.enqueue_recorded(land_core::PendingItem {
        sequence: 9,
        resolved_at_tick: 1,
        payload: ItemPayload::Lifecycle {
            kind: Lifecycle::Joined,
            session_id: None,
            player_id: None,
        },
    });
    // Fresh sequences continue after the recorded one.
    assert_eq!(queue.enqueue(event("next"), 1), 10);

    let due = queue.drain_due(1);
    assert_eq!(due[0].sequence, 9);
    assert_eq!(due[1].sequence, 10);
}
