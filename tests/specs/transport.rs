// SPDX-License-Identifier: MIT

//! Transport specs: reconnect eviction, duplicate joins, join errors,
//! slot compression, and the schema endpoint.

use crate::prelude::*;
use land_core::StateValue;
use land_wire::{ClientFrame, JoinFrame, ServerFrame};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn reconnect_evicts_previous_session() {
    let server = TestServer::start().await;

    let mut first = server.client().await;
    first.send_join("counter", "rc", "p").await;
    first.expect_join_ack().await;

    // Give the joined lifecycle a tick so `players` contains p.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut second = server.client().await;
    second.send_join("counter", "rc", "p").await;
    second.expect_join_ack().await;

    // S1 receives a normal close; no leave reached the keeper.
    let close = first.expect_close().await;
    assert_eq!(close.code, "SESSION_REPLACED");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = server
        .realm
        .admin_snapshot(&land_core::LandId::new("counter", "rc"))
        .await
        .expect("land exists");
    assert_eq!(
        snapshot.as_map().unwrap()["players"],
        StateValue::list(["p"]),
        "player list unchanged by the reconnect"
    );

    // The new session is live.
    second.send_action(4, ("counter", "rc"), "increment", StateValue::Null).await;
    second.expect_response(4).await.expect("replacement session works");

    server.shutdown.cancel();
}

#[tokio::test]
async fn duplicate_join_on_bound_session_is_rejected() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.send_join("counter", "dj", "alice").await;
    client.expect_join_ack().await;

    client.send_join("counter", "dj", "alice").await;
    match client.next().await {
        ServerFrame::JoinError { error, .. } => {
            assert_eq!(error.code, "ALREADY_JOINED");
        }
        other => panic!("expected JoinError, got {other:?}"),
    }

    // The existing session is unaffected.
    client.send_action(7, ("counter", "dj"), "increment", StateValue::Null).await;
    client.expect_response(7).await.expect("session still bound");

    server.shutdown.cancel();
}

#[tokio::test]
async fn unknown_land_type_yields_join_error_and_allows_retry() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.send_join("casino", "x", "alice").await;
    match client.next().await {
        ServerFrame::JoinError { error, .. } => {
            assert_eq!(error.code, "UNKNOWN_LAND_TYPE");
        }
        other => panic!("expected JoinError, got {other:?}"),
    }

    // Session retained: a corrected join succeeds.
    client.send_join("counter", "retry", "alice").await;
    client.expect_join_ack().await;

    server.shutdown.cancel();
}

#[tokio::test]
async fn action_before_join_closes_with_invalid_frame() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.send_action(1, ("counter", "x"), "increment", StateValue::Null).await;
    let close = client.expect_close().await;
    assert_eq!(close.code, "INVALID_FRAME");

    server.shutdown.cancel();
}

#[tokio::test]
async fn join_without_instance_creates_a_land() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client
        .send(&ClientFrame::Join(JoinFrame {
            request_id: 1,
            land_type: "counter".to_string(),
            instance_id: None,
            player_id: Some("alice".to_string()),
            client_id: None,
            metadata: StateValue::Null,
        }))
        .await;

    match client.next().await {
        ServerFrame::JoinAck { land_id, .. } => {
            assert_eq!(land_id.land_type, "counter");
            assert!(!land_id.instance_id.is_empty());
        }
        other => panic!("expected JoinAck, got {other:?}"),
    }

    server.shutdown.cancel();
}

#[tokio::test]
async fn slot_compression_announces_long_keys_once() {
    let server = TestServer::start().await;
    let long_player = "0123456789abcdef0123456789abcdef-036";

    let mut client = server.client().await;
    client.send_join("game", "slots", long_player).await;
    let mut view = client.expect_join_ack().await;

    // Two grants: the first diff announces the key, the second refers to
    // it by slot only.
    client
        .send_action(1, ("game", "slots"), "grant", StateValue::map([("item", "axe")]))
        .await;
    client.expect_response(1).await.expect("grant succeeds");
    let (first_update, first_bytes) = client.next_with_bytes().await;

    client
        .send_action(2, ("game", "slots"), "grant", StateValue::map([("item", "rope")]))
        .await;
    client.expect_response(2).await.expect("grant succeeds");
    let (second_update, second_bytes) = client.next_with_bytes().await;

    let contains = |haystack: &[u8], needle: &[u8]| {
        haystack.windows(needle.len()).any(|w| w == needle)
    };
    assert!(contains(&first_bytes, long_player.as_bytes()));
    assert!(!contains(&second_bytes, long_player.as_bytes()));

    // Both forms apply identically to the client view.
    for update in [first_update, second_update] {
        match update {
            ServerFrame::StateDiff { patches, .. } => {
                land_core::apply_patches(&mut view, &patches).expect("patches apply");
            }
            other => panic!("expected StateDiff, got {other:?}"),
        }
    }
    let inventories = view.as_map().unwrap()["inventories"].as_map().unwrap();
    assert_eq!(inventories[long_player], StateValue::list(["axe", "rope"]));

    server.shutdown.cancel();
}

#[tokio::test]
async fn schema_endpoint_serves_the_realm_document() {
    let server = TestServer::start().await;

    let mut stream = tokio::net::TcpStream::connect(server.addr).await.expect("connect");
    stream
        .write_all(b"GET /schema HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("write request");

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.expect("read response");
    let response = String::from_utf8_lossy(&response);

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    let body = response.split("\r\n\r\n").nth(1).expect("http body");
    let document: serde_json::Value = serde_json::from_str(body).expect("json body");
    assert!(document["lands"]["counter"]["schema"]["state"]["count"].is_object());
    assert!(document["lands"]["game"].is_object());
    assert!(document["engine_version"].is_string());

    server.shutdown.cancel();
}
