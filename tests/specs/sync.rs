// SPDX-License-Identifier: MIT

//! State synchronization specs: join/increment, per-player slicing,
//! resolver failure, shared broadcast updates.

use crate::prelude::*;
use land_core::StateValue;
use land_wire::ServerFrame;
use std::time::Duration;

#[tokio::test]
async fn join_then_increment() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.send_join("counter", "x", "alice").await;
    let snapshot = client.expect_join_ack().await;
    assert_eq!(snapshot.as_map().unwrap()["count"], StateValue::Int(0));

    client.send_action(2, ("counter", "x"), "increment", StateValue::Null).await;
    let payload = client.expect_response(2).await.expect("action should succeed");
    assert_eq!(payload, StateValue::map([("newCount", 1i64)]));

    // The diff for the same tick carries exactly the count patch.
    match client.next().await {
        ServerFrame::StateDiff { patches, .. } => {
            assert_eq!(patches.len(), 1);
            assert_eq!(patches[0].path.canonical(), "count");
            assert_eq!(patches[0].value, Some(StateValue::Int(1)));
        }
        other => panic!("expected StateDiff, got {other:?}"),
    }

    server.shutdown.cancel();
}

#[tokio::test]
async fn per_player_slicing() {
    let server = TestServer::start().await;

    let mut alice = server.client().await;
    alice.send_join("game", "y", "alice").await;
    let for_alice = alice.expect_join_ack().await;
    let inventories = for_alice.as_map().unwrap()["inventories"].as_map().unwrap();
    assert_eq!(inventories.len(), 1);
    assert_eq!(inventories["alice"], StateValue::list(["sword"]));

    let mut bob = server.client().await;
    bob.send_join("game", "y", "bob").await;
    let for_bob = bob.expect_join_ack().await;
    let inventories = for_bob.as_map().unwrap()["inventories"].as_map().unwrap();
    assert_eq!(inventories.len(), 1);
    assert_eq!(inventories["bob"], StateValue::list(["bow"]));

    server.shutdown.cancel();
}

#[tokio::test]
async fn slice_updates_stay_private() {
    let server = TestServer::start().await;

    let mut alice = server.client().await;
    alice.send_join("game", "z", "alice").await;
    alice.expect_join_ack().await;

    let mut bob = server.client().await;
    bob.send_join("game", "z", "bob").await;
    bob.expect_join_ack().await;

    // Alice grants herself an item; bob must not see any update.
    alice
        .send_action(5, ("game", "z"), "grant", StateValue::map([("item", "shield")]))
        .await;
    alice.expect_response(5).await.expect("grant succeeds");

    match alice.next().await {
        ServerFrame::StateDiff { patches, .. } => {
            assert!(patches.iter().all(|p| p.path.canonical().starts_with("inventories.alice")));
        }
        other => panic!("expected StateDiff, got {other:?}"),
    }
    assert!(bob.expect_silence(Duration::from_millis(200)).await);

    server.shutdown.cancel();
}

#[tokio::test]
async fn resolver_failure_fails_action_without_state_change() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.send_join("counter", "rf", "alice").await;
    client.expect_join_ack().await;

    client.send_action(9, ("counter", "rf"), "fetch_product", StateValue::Null).await;
    let error = client.expect_response(9).await.expect_err("resolver failure expected");
    assert_eq!(error.code, "RESOLVER_FAILED");

    // No state update follows: the handler never ran.
    assert!(client.expect_silence(Duration::from_millis(200)).await);

    let snapshot = server
        .realm
        .admin_snapshot(&land_core::LandId::new("counter", "rf"))
        .await
        .expect("land exists");
    assert_eq!(snapshot.as_map().unwrap()["count"], StateValue::Int(0));

    server.shutdown.cancel();
}

#[tokio::test]
async fn broadcast_update_is_shared_between_sessions() {
    let server = TestServer::start().await;

    let mut alice = server.client().await;
    alice.send_join("counter", "bc", "alice").await;
    alice.expect_join_ack().await;

    let mut bob = server.client().await;
    bob.send_join("counter", "bc", "bob").await;
    bob.expect_join_ack().await;

    alice.send_action(3, ("counter", "bc"), "increment", StateValue::Null).await;
    alice.expect_response(3).await.expect("increment succeeds");

    let (alice_update, alice_bytes) = alice.next_with_bytes().await;
    let (bob_update, bob_bytes) = bob.next_with_bytes().await;

    // One encoded frame, replicated byte for byte.
    assert_eq!(alice_bytes, bob_bytes);
    match (alice_update, bob_update) {
        (
            ServerFrame::BroadcastUpdate { patches: a, .. },
            ServerFrame::BroadcastUpdate { patches: b, .. },
        ) => {
            assert_eq!(a, b);
            assert_eq!(a[0].path.canonical(), "count");
            assert_eq!(a[0].value, Some(StateValue::Int(1)));
        }
        other => panic!("expected shared BroadcastUpdate frames, got {other:?}"),
    }

    server.shutdown.cancel();
}

#[tokio::test]
async fn client_view_follows_patch_stream() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.send_join("counter", "cv", "alice").await;
    let mut view = client.expect_join_ack().await;

    for request_id in 1..=3u64 {
        client.send_action(request_id, ("counter", "cv"), "increment", StateValue::Null).await;
        client.expect_response(request_id).await.expect("increment succeeds");
        match client.next().await {
            ServerFrame::StateDiff { patches, .. } => {
                land_core::apply_patches(&mut view, &patches).expect("patches apply");
            }
            other => panic!("expected StateDiff, got {other:?}"),
        }
        assert_eq!(
            view.as_map().unwrap()["count"],
            StateValue::Int(request_id as i64),
            "client view tracks the authoritative count"
        );
    }

    server.shutdown.cancel();
}
