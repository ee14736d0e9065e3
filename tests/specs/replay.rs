// SPDX-License-Identifier: MIT

//! Re-evaluation specs: long synthetic recordings and recordings produced
//! by a live server.

use crate::prelude::*;
use land_core::{
    state_hash, ItemPayload, LandId, Lifecycle, PendingItem, PlayerId, SessionId, StateTree,
    StateValue,
};
use land_engine::exec::execute_items;
use land_engine::record::{RecordingFile, RecordingFrame, RecordingMetadata};
use land_engine::{replay, verify, LandDefinition, PendingQueue, ResolverOutputs};
use std::time::Duration;

fn action(type_id: &str, request_id: u64) -> ItemPayload {
    ItemPayload::Action {
        session_id: SessionId::from_string("ses-sp"),
        player_id: PlayerId::new("alice"),
        request_id,
        type_id: type_id.to_string(),
        payload: StateValue::Null,
    }
}

fn client_event(type_id: &str) -> ItemPayload {
    ItemPayload::ClientEvent {
        session_id: SessionId::from_string("ses-sp"),
        player_id: PlayerId::new("alice"),
        type_id: type_id.to_string(),
        payload: StateValue::Null,
    }
}

fn lifecycle(kind: Lifecycle) -> ItemPayload {
    ItemPayload::Lifecycle {
        kind,
        session_id: Some(SessionId::from_string("ses-sp")),
        player_id: Some(PlayerId::new("alice")),
    }
}

/// Run the live execution path over scripted inputs, producing the
/// recording a keeper would have written.
fn record_run(
    definition: &LandDefinition,
    land_id: &LandId,
    ticks: u64,
    mut inputs: Vec<(u64, ItemPayload)>,
) -> RecordingFile {
    let mut tree =
        StateTree::new(definition.schema().clone(), definition.initial_state(land_id))
            .expect("initial state validates");
    let initial_state_hash = state_hash(&tree.current_snapshot().root, definition.schema());

    let mut queue = PendingQueue::new();
    let mut frames = Vec::new();
    inputs.sort_by_key(|(tick, _)| *tick);
    let mut inputs = inputs.into_iter().peekable();

    for _ in 0..ticks {
        let tick_id = tree.advance_tick();
        while inputs.peek().map(|(tick, _)| *tick == tick_id).unwrap_or(false) {
            if let Some((_, payload)) = inputs.next() {
                queue.enqueue(payload, tick_id);
            }
        }
        let items = queue.drain_due(tick_id);
        let outputs = ResolverOutputs::new();
        let outcome =
            execute_items(&mut tree, definition, land_id, tick_id, &items, &outputs)
                .expect("no engine fault");
        let hash = state_hash(&tree.current_snapshot().root, definition.schema());
        frames.push(RecordingFrame::capture(tick_id, &items, &outputs, &outcome.events, hash));
    }

    RecordingFile {
        metadata: RecordingMetadata {
            land_id: land_id.to_string(),
            land_type: land_id.land_type.clone(),
            created_at_ms: 0,
            initial_state_hash,
            land_config: definition.config().clone(),
            version: land_engine::record::ENGINE_VERSION.to_string(),
        },
        frames,
    }
}

#[test]
fn long_recording_replays_hash_identical() {
    let definition = counter_definition(fast_config());
    let land_id = LandId::new("counter", "long");

    // 262 ticks: 6 actions, 4 client events, 2 lifecycle events,
    // interleaved with long idle stretches.
    let inputs = vec![
        (1, lifecycle(Lifecycle::Joined)),
        (7, action("increment", 1)),
        (19, client_event("noop")),
        (40, action("increment", 2)),
        (41, action("increment", 3)),
        (77, client_event("noop")),
        (120, action("increment", 4)),
        (121, client_event("noop")),
        (180, action("increment", 5)),
        (201, client_event("noop")),
        (242, action("increment", 6)),
        (260, lifecycle(Lifecycle::Left)),
    ];
    let file = record_run(&definition, &land_id, 262, inputs);
    assert_eq!(file.frames.len(), 262);

    let report = verify(&definition, &file).expect("replay runs");
    assert!(report.ok, "first mismatch at tick {:?}", report.first_mismatch_tick);
    assert_eq!(report.ticks, 262);

    // Two independent replays agree hash-for-hash.
    let first = replay(&definition, &file).expect("first replay");
    let second = replay(&definition, &file).expect("second replay");
    assert_eq!(first.hashes, second.hashes);
    assert_eq!(first.hashes.len(), 262);
}

#[tokio::test]
async fn live_server_recording_verifies() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = TestServer::start_with(Some(dir.path().to_path_buf())).await;

    let mut client = server.client().await;
    client.send_join("counter", "rec", "alice").await;
    client.expect_join_ack().await;

    for request_id in 1..=3u64 {
        client.send_action(request_id, ("counter", "rec"), "increment", StateValue::Null).await;
        client.expect_response(request_id).await.expect("increment succeeds");
        client.next().await; // state update
    }

    // Let a few idle ticks pass, then stop: finalize flushes the file.
    tokio::time::sleep(Duration::from_millis(100)).await;
    server.realm.shutdown().await;

    let path = dir.path().join("counter").join("rec.json");
    let file = RecordingFile::load(&path).expect("recording exists");
    assert!(!file.frames.is_empty());
    assert_eq!(file.metadata.land_type, "counter");

    // The recorded run verifies against the same definition.
    let definition = counter_definition(fast_config());
    let report = verify(&definition, &file).expect("replay runs");
    assert!(report.ok, "first mismatch at tick {:?}", report.first_mismatch_tick);

    server.shutdown.cancel();
}
