// SPDX-License-Identifier: MIT

//! Per-connection session task.
//!
//! State machine: Connected → Joining → Joined → Leaving → Closed. The
//! join handshake is processed inline (no other frames are read while it
//! is in flight), after which the task pumps inbound frames to the keeper
//! and keeper-encoded outbound frames to the socket. Control frames sent
//! from here (join errors, closes) never carry patch paths, so they are
//! encoded against an empty path table and a throwaway slot table.

use crate::identity::IdentityResolver;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use land_core::{codes, ClientError, SessionId};
use land_engine::{JoinRequest, KeeperHandle, LandRealm, Outbound};
use land_wire::{
    decode_client_frame, encode_server_frame, ClientFrame, JoinFrame, PathTable, ServerFrame,
    SlotTable,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Shared dependencies for every session task.
pub(crate) struct SessionCtx {
    pub realm: Arc<LandRealm>,
    pub identity: Arc<dyn IdentityResolver>,
    pub join_timeout: Duration,
}

type WsWriter = futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>;
type WsReader = futures_util::stream::SplitStream<WebSocketStream<TcpStream>>;

/// Encode a control frame (no patch paths) for direct transport sends.
fn encode_control(frame: &ServerFrame) -> Option<Bytes> {
    let paths = PathTable::new();
    let mut slots = SlotTable::new();
    match encode_server_frame(frame, &paths, &mut slots) {
        Ok(bytes) => Some(Bytes::from(bytes)),
        Err(e) => {
            tracing::warn!(error = %e, "control frame encode failed");
            None
        }
    }
}

async fn send_control(write: &mut WsWriter, frame: &ServerFrame) -> bool {
    match encode_control(frame) {
        Some(bytes) => write.send(Message::Binary(bytes)).await.is_ok(),
        None => false,
    }
}

async fn close_with(write: &mut WsWriter, error: ClientError) {
    let _ = send_control(write, &ServerFrame::Close { error }).await;
    let _ = write.close().await;
}

/// Next decodable client frame, or `None` when the socket ended.
async fn next_client_frame(read: &mut WsReader) -> Option<Result<ClientFrame, ClientError>> {
    loop {
        match read.next().await? {
            Ok(Message::Binary(bytes)) => {
                return Some(decode_client_frame(&bytes).map_err(|e| {
                    ClientError::new(codes::INVALID_FRAME, e.to_string())
                }));
            }
            Ok(Message::Close(_)) => return None,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(_) => {
                return Some(Err(ClientError::new(
                    codes::INVALID_FRAME,
                    "binary frames expected",
                )));
            }
            Err(e) => {
                tracing::debug!(error = %e, "socket read error");
                return None;
            }
        }
    }
}

/// Drive one accepted WebSocket connection to completion.
pub(crate) async fn run_session(stream: TcpStream, ctx: Arc<SessionCtx>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    // Joining: accept Join frames until one is granted. A denial keeps the
    // session open for retry; auth failures and timeouts close it.
    let (grant, handle, out_rx) = loop {
        let frame = match tokio::time::timeout(ctx.join_timeout, next_client_frame(&mut read))
            .await
        {
            Err(_) => {
                close_with(
                    &mut write,
                    ClientError::new(codes::JOIN_TIMEOUT, "no join within the handshake deadline"),
                )
                .await;
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(error))) => {
                close_with(&mut write, error).await;
                return;
            }
            Ok(Some(Ok(ClientFrame::Join(join)))) => join,
            Ok(Some(Ok(_))) => {
                close_with(
                    &mut write,
                    ClientError::new(codes::INVALID_FRAME, "join expected before other frames"),
                )
                .await;
                return;
            }
        };

        match try_join(&ctx, &frame).await {
            Ok(bound) => break bound,
            Err(JoinFailure::Auth(error)) => {
                close_with(&mut write, error).await;
                return;
            }
            Err(JoinFailure::Denied(error)) => {
                let denied =
                    ServerFrame::JoinError { request_id: frame.request_id, error };
                if !send_control(&mut write, &denied).await {
                    return;
                }
            }
        }
    };

    let session_id = grant.session_id;
    let land_id = grant.land_id.clone();
    tracing::debug!(land = %land_id, session = %session_id, "session bound");

    pump(&mut write, &mut read, &handle, session_id, &land_id, out_rx).await;
}

enum JoinFailure {
    /// Close the connection (`AUTH_FAILED`).
    Auth(ClientError),
    /// Answer with `JoinError`; the session may retry.
    Denied(ClientError),
}

async fn try_join(
    ctx: &SessionCtx,
    frame: &JoinFrame,
) -> Result<(land_engine::JoinGrant, KeeperHandle, mpsc::Receiver<Outbound>), JoinFailure> {
    let identity =
        ctx.identity.resolve(frame).await.map_err(JoinFailure::Auth)?;

    let (land_id, handle) = ctx
        .realm
        .route_join(&frame.land_type, frame.instance_id.as_deref())
        .map_err(JoinFailure::Denied)?;

    let definition = ctx
        .realm
        .manager(&land_id.land_type)
        .map(|manager| manager.definition().clone())
        .ok_or_else(|| {
            JoinFailure::Denied(ClientError::new(codes::UNKNOWN_LAND_TYPE, "no such land type"))
        })?;

    let (out_tx, out_rx) = mpsc::channel(definition.config().outbound_buffer);
    let request = JoinRequest {
        request_id: frame.request_id,
        land_id: land_id.clone(),
        identity,
        metadata: frame.metadata.clone(),
    };

    let grant = tokio::time::timeout(definition.config().join_timeout(), handle.join(request, out_tx))
        .await
        .map_err(|_| {
            JoinFailure::Denied(ClientError::new(codes::JOIN_TIMEOUT, "land did not answer in time"))
        })?
        .map_err(JoinFailure::Denied)?;

    Ok((grant, handle, out_rx))
}

/// Joined: route inbound frames to the keeper, outbound frames to the
/// socket. Returns once either side closes.
async fn pump(
    write: &mut WsWriter,
    read: &mut WsReader,
    handle: &KeeperHandle,
    session_id: SessionId,
    land_id: &land_core::LandId,
    mut out_rx: mpsc::Receiver<Outbound>,
) {
    // Eviction and keeper shutdown close the channel; business logic saw
    // no leave in that case, so the keeper must not be notified again.
    let mut notify_leave = true;

    loop {
        tokio::select! {
            inbound = next_client_frame(read) => match inbound {
                None => break,
                Some(Err(error)) => {
                    close_with(write, error).await;
                    break;
                }
                Some(Ok(ClientFrame::Join(join))) => {
                    // Duplicate join on a bound session: reject, keep going.
                    let frame = ServerFrame::JoinError {
                        request_id: join.request_id,
                        error: ClientError::already_joined(),
                    };
                    if !send_control(write, &frame).await {
                        break;
                    }
                }
                Some(Ok(ClientFrame::Action(action))) => {
                    if action.land_id == *land_id {
                        handle
                            .action(session_id, action.request_id, action.type_id, action.payload)
                            .await;
                    } else {
                        let frame = ServerFrame::action_err(
                            action.request_id,
                            ClientError::new(codes::LAND_NOT_FOUND, "action targets another land"),
                        );
                        if !send_control(write, &frame).await {
                            break;
                        }
                    }
                }
                Some(Ok(ClientFrame::ClientEvent(event))) => {
                    if event.land_id == *land_id {
                        handle.client_event(session_id, event.type_id, event.payload).await;
                    }
                }
            },
            outbound = out_rx.recv() => match outbound {
                Some(Outbound::Frame(bytes)) => {
                    if write.send(Message::Binary(bytes)).await.is_err() {
                        tracing::debug!(session = %session_id, "transport write failed");
                        break;
                    }
                }
                Some(Outbound::Close(bytes)) => {
                    let _ = write.send(Message::Binary(bytes)).await;
                    let _ = write.close().await;
                    notify_leave = false;
                    break;
                }
                None => {
                    // Keeper dropped this session (slow consumer or land
                    // shutdown); the socket just follows.
                    let _ = write.close().await;
                    notify_leave = false;
                    break;
                }
            },
        }
    }

    if notify_leave {
        handle.leave(session_id).await;
    }
}
