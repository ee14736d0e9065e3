// SPDX-License-Identifier: MIT

//! Shared harness: realm definitions, a served realm, and a WebSocket
//! test client that speaks the binary protocol.

use futures_util::{SinkExt, StreamExt};
use land_core::{ClientError, FieldSchema, FieldShape, LandConfig, NodeSchema, StateValue};
use land_engine::{HandlerError, LandDefinition, LandRealm};
use land_server::{GuestIdentity, Server};
use land_wire::{
    decode_server_frame, encode_client_frame, ActionFrame, ClientEventFrame, ClientFrame,
    JoinFrame, PathTable, ServerFrame, SlotTable,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub const FRAME_TIMEOUT: Duration = Duration::from_secs(10);

pub fn fast_config() -> LandConfig {
    LandConfig { tick_period_ms: 10, empty_grace_ms: 60_000, ..Default::default() }
}

pub fn counter_schema() -> NodeSchema {
    NodeSchema::new()
        .field("count", FieldSchema::broadcast(FieldShape::Scalar))
        .field("players", FieldSchema::server_only(FieldShape::list_of(FieldShape::Scalar)))
}

/// Counter land: a broadcast counter with join/leave tracking, plus a
/// resolver-backed action that always fails.
pub fn counter_definition(config: LandConfig) -> LandDefinition {
    LandDefinition::builder("counter")
        .schema(counter_schema())
        .config(config)
        .initial_state(|_| {
            StateValue::map([
                ("count", StateValue::Int(0)),
                ("players", StateValue::List(Vec::new())),
            ])
        })
        .resolver(FailingResolver)
        .action("increment", [], |draft, _payload, _ctx| {
            let count = draft.get("count").and_then(StateValue::as_int).unwrap_or(0) + 1;
            draft.set("count", count);
            Ok(StateValue::map([("newCount", count)]))
        })
        .action("fetch_product", ["fetch_product"], |draft, _payload, _ctx| {
            // Unreachable while the resolver fails; would corrupt `count`.
            draft.set("count", 999i64);
            Ok(StateValue::Null)
        })
        .on_join(|draft, _payload, ctx| {
            if let Some(player) = ctx.player_id {
                if let Some(players) = draft.field_mut("players").as_list_mut() {
                    players.push(StateValue::from(player.as_str()));
                }
            }
            Ok(())
        })
        .on_leave(|draft, _payload, ctx| {
            if let Some(player) = ctx.player_id {
                if let Some(players) = draft.field_mut("players").as_list_mut() {
                    players.retain(|p| p.as_str() != Some(player.as_str()));
                }
            }
            Ok(())
        })
        .build()
        .unwrap_or_else(|e| panic!("counter definition invalid: {e}"))
}

pub fn game_schema() -> NodeSchema {
    NodeSchema::new()
        .field("round", FieldSchema::broadcast(FieldShape::Scalar))
        .field("inventories", FieldSchema::per_player(FieldShape::list_of(FieldShape::Scalar)))
}

/// Game land: per-player sliced inventories, as in the slicing scenario.
pub fn game_definition(config: LandConfig) -> LandDefinition {
    LandDefinition::builder("game")
        .schema(game_schema())
        .config(config)
        .initial_state(|_| {
            StateValue::map([
                ("round", StateValue::Int(0)),
                (
                    "inventories",
                    StateValue::map([
                        ("alice", StateValue::list(["sword"])),
                        ("bob", StateValue::list(["bow"])),
                    ]),
                ),
            ])
        })
        .action("grant", [], |draft, payload, ctx| {
            let item = payload
                .as_map()
                .and_then(|m| m.get("item"))
                .and_then(StateValue::as_str)
                .ok_or_else(|| HandlerError::from("missing item"))?
                .to_string();
            let player = ctx
                .player_id
                .map(|p| p.to_string())
                .ok_or_else(|| HandlerError::from("no player"))?;
            if let Some(map) = draft.field_mut("inventories").as_map_mut() {
                let entry = map.entry(player).or_insert_with(|| StateValue::List(Vec::new()));
                if let Some(items) = entry.as_list_mut() {
                    items.push(StateValue::from(item));
                }
            }
            Ok(StateValue::Null)
        })
        .build()
        .unwrap_or_else(|e| panic!("game definition invalid: {e}"))
}

struct FailingResolver;

#[async_trait::async_trait]
impl land_engine::Resolver for FailingResolver {
    fn name(&self) -> &str {
        "fetch_product"
    }

    async fn resolve(
        &self,
        _ctx: &land_engine::ResolverCtx,
    ) -> Result<StateValue, land_engine::ResolverError> {
        Err(land_engine::ResolverError::failed("upstream unavailable"))
    }
}

/// A realm served on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub realm: Arc<LandRealm>,
    pub shutdown: CancellationToken,
    /// Path table shared by every test client (all schemas merged).
    pub paths: Arc<PathTable>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(None).await
    }

    pub async fn start_with(recording_dir: Option<PathBuf>) -> Self {
        let mut realm = LandRealm::new();
        if let Some(dir) = recording_dir {
            realm = realm.with_recording_dir(dir);
        }
        realm.register(counter_definition(fast_config()));
        realm.register(game_definition(fast_config()));
        let realm = Arc::new(realm);

        let mut paths = PathTable::new();
        paths.add_schema(&counter_schema()).unwrap();
        paths.add_schema(&game_schema()).unwrap();

        let server = Server::bind("127.0.0.1:0", Arc::clone(&realm), Arc::new(GuestIdentity))
            .await
            .expect("bind");
        let addr = server.local_addr().expect("local addr");
        let shutdown = server.shutdown_token();
        tokio::spawn(server.serve());

        Self { addr, realm, shutdown, paths: Arc::new(paths) }
    }

    pub async fn client(&self) -> TestClient {
        TestClient::connect(self.addr, Arc::clone(&self.paths)).await
    }
}

pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    paths: Arc<PathTable>,
    pub slots: SlotTable,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr, paths: Arc<PathTable>) -> Self {
        let (ws, _) = connect_async(format!("ws://{addr}")).await.expect("ws connect");
        Self { ws, paths, slots: SlotTable::new() }
    }

    pub async fn send(&mut self, frame: &ClientFrame) {
        let bytes = encode_client_frame(frame).expect("encode");
        self.ws.send(Message::Binary(bytes.into())).await.expect("send");
    }

    pub async fn send_join(&mut self, land_type: &str, instance: &str, player: &str) {
        self.send(&ClientFrame::Join(JoinFrame {
            request_id: 1,
            land_type: land_type.to_string(),
            instance_id: Some(instance.to_string()),
            player_id: Some(player.to_string()),
            client_id: None,
            metadata: StateValue::Null,
        }))
        .await;
    }

    pub async fn send_action(
        &mut self,
        request_id: u64,
        land: (&str, &str),
        type_id: &str,
        payload: StateValue,
    ) {
        self.send(&ClientFrame::Action(ActionFrame {
            request_id,
            land_id: land_core::LandId::new(land.0, land.1),
            type_id: type_id.to_string(),
            payload,
        }))
        .await;
    }

    pub async fn send_event(&mut self, land: (&str, &str), type_id: &str, payload: StateValue) {
        self.send(&ClientFrame::ClientEvent(ClientEventFrame {
            land_id: land_core::LandId::new(land.0, land.1),
            type_id: type_id.to_string(),
            payload,
        }))
        .await;
    }

    /// Next server frame with its raw bytes.
    pub async fn next_with_bytes(&mut self) -> (ServerFrame, Vec<u8>) {
        loop {
            let message = tokio::time::timeout(FRAME_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("socket closed")
                .expect("socket error");
            match message {
                Message::Binary(bytes) => {
                    let frame = decode_server_frame(&bytes, &self.paths, &mut self.slots)
                        .expect("server frame decodes");
                    return (frame, bytes.to_vec());
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => panic!("socket closed while waiting for a frame"),
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    pub async fn next(&mut self) -> ServerFrame {
        self.next_with_bytes().await.0
    }

    /// Expect a JoinAck and return its snapshot.
    pub async fn expect_join_ack(&mut self) -> StateValue {
        match self.next().await {
            ServerFrame::JoinAck { snapshot, .. } => snapshot,
            other => panic!("expected JoinAck, got {other:?}"),
        }
    }

    /// Expect an ActionResponse for a request id.
    pub async fn expect_response(&mut self, request_id: u64) -> Result<StateValue, ClientError> {
        match self.next().await {
            ServerFrame::ActionResponse { request_id: got, ok, payload, error } => {
                assert_eq!(got, request_id, "response for the wrong request");
                if ok {
                    Ok(payload.unwrap_or(StateValue::Null))
                } else {
                    Err(error.unwrap_or_else(|| ClientError::new("MISSING", "no error payload")))
                }
            }
            other => panic!("expected ActionResponse, got {other:?}"),
        }
    }

    /// True when no frame arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.ws.next()).await.is_err()
    }

    /// Wait for the close frame (opcode 99).
    pub async fn expect_close(&mut self) -> ClientError {
        loop {
            match self.next().await {
                ServerFrame::Close { error } => return error,
                // State updates may still be in flight before the close.
                ServerFrame::StateDiff { .. }
                | ServerFrame::BroadcastUpdate { .. }
                | ServerFrame::ServerEvent { .. } => {}
                other => panic!("expected Close, got {other:?}"),
            }
        }
    }
}
