// SPDX-License-Identifier: MIT

//! LandKeeper: the serialized per-Land runtime.
//!
//! One tokio task per keeper, fed by a bounded mpsc inbox. Joins are
//! handled between ticks (the state only mutates inside `run_tick`), so a
//! join observes exactly the state the previous flush left behind.
//! Everything else (actions, client events, lifecycle transitions) is
//! enqueued with a `(resolved_at_tick, sequence)` position and executed in
//! that total order at the next tick boundary.
//!
//! Outbound frames are encoded here, against each session's slot table,
//! and pushed to the session task through a bounded channel. A full
//! channel drops the session (`SLOW_CONSUMER`); the keeper never blocks on
//! any one session.

use crate::definition::{JoinRequest, LandDefinition};
use crate::exec::{execute_items, EngineFault, TickOutcome};
use crate::queue::PendingQueue;
use crate::record::{Recorder, RecordingFrame};
use crate::resolver::{run_resolvers, ResolverCtx, ResolverOutputs};
use crate::sync::{SyncEngine, SyncUpdate};
use bytes::Bytes;
use land_core::{
    codes, state_hash, ClientError, Clock, ItemPayload, LandId, Lifecycle, PendingItem, PlayerId,
    Recipient, SchemaError, ServerEvent, SessionId, StateTree, StateValue, Visibility,
};
use land_wire::{encode_server_frame, ServerFrame, SlotTable};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Inbox capacity per keeper. Producers await on a full inbox, which
/// backpressures that producer only.
const INBOX_CAPACITY: usize = 256;

/// A frame on its way to one session's transport task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(Bytes),
    /// Deliver the encoded close frame, then close the connection.
    Close(Bytes),
}

/// Reply to an accepted join.
#[derive(Debug, Clone)]
pub struct JoinGrant {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    pub land_id: LandId,
}

/// Messages a keeper accepts on its inbox.
#[derive(Debug)]
pub enum KeeperMsg {
    Join {
        request: JoinRequest,
        out: mpsc::Sender<Outbound>,
        reply: oneshot::Sender<Result<JoinGrant, ClientError>>,
    },
    Leave {
        session_id: SessionId,
    },
    Action {
        session_id: SessionId,
        request_id: u64,
        type_id: String,
        payload: StateValue,
    },
    ClientEvent {
        session_id: SessionId,
        type_id: String,
        payload: StateValue,
    },
    /// Explicit flush outside the tick cadence.
    Flush,
    AdminSnapshot {
        reply: oneshot::Sender<StateValue>,
    },
    Stop {
        reply: Option<oneshot::Sender<()>>,
    },
}

/// Keeper termination notice consumed by the manager's reaper.
#[derive(Debug, Clone)]
pub struct KeeperExit {
    pub land_id: LandId,
    pub failed: bool,
}

/// Cheap handle for talking to a running keeper.
#[derive(Debug, Clone)]
pub struct KeeperHandle {
    land_id: LandId,
    tx: mpsc::Sender<KeeperMsg>,
}

impl KeeperHandle {
    pub fn land_id(&self) -> &LandId {
        &self.land_id
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    pub async fn join(
        &self,
        request: JoinRequest,
        out: mpsc::Sender<Outbound>,
    ) -> Result<JoinGrant, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(KeeperMsg::Join { request, out, reply })
            .await
            .map_err(|_| ClientError::new(codes::LAND_FAILED, "land is gone"))?;
        rx.await.map_err(|_| ClientError::new(codes::LAND_FAILED, "land is gone"))?
    }

    pub async fn action(
        &self,
        session_id: SessionId,
        request_id: u64,
        type_id: String,
        payload: StateValue,
    ) {
        let _ = self
            .tx
            .send(KeeperMsg::Action { session_id, request_id, type_id, payload })
            .await;
    }

    pub async fn client_event(&self, session_id: SessionId, type_id: String, payload: StateValue) {
        let _ = self.tx.send(KeeperMsg::ClientEvent { session_id, type_id, payload }).await;
    }

    pub async fn leave(&self, session_id: SessionId) {
        let _ = self.tx.send(KeeperMsg::Leave { session_id }).await;
    }

    pub async fn flush(&self) {
        let _ = self.tx.send(KeeperMsg::Flush).await;
    }

    /// Authoritative projection for admin exports.
    pub async fn admin_snapshot(&self) -> Option<StateValue> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(KeeperMsg::AdminSnapshot { reply }).await.ok()?;
        rx.await.ok()
    }

    /// Graceful stop: drain, finalize recording, release sessions.
    pub async fn stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(KeeperMsg::Stop { reply: Some(reply) }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

struct SessionEntry {
    recipient: Recipient,
    out: mpsc::Sender<Outbound>,
    slots: SlotTable,
}

/// The per-Land runtime actor.
pub struct LandKeeper<C: Clock> {
    land_id: LandId,
    definition: std::sync::Arc<LandDefinition>,
    tree: StateTree,
    queue: PendingQueue,
    sync: SyncEngine,
    sessions: HashMap<SessionId, SessionEntry>,
    players: HashMap<PlayerId, SessionId>,
    recorder: Option<Recorder>,
    clock: C,
    rx: mpsc::Receiver<KeeperMsg>,
    exit_tx: mpsc::UnboundedSender<KeeperExit>,
    empty_since: Option<Instant>,
    ever_joined: bool,
    stop_reply: Option<oneshot::Sender<()>>,
}

impl<C: Clock + 'static> LandKeeper<C> {
    /// Build and spawn a keeper; returns its handle.
    pub fn spawn(
        land_id: LandId,
        definition: std::sync::Arc<LandDefinition>,
        clock: C,
        recording_dir: Option<&Path>,
        exit_tx: mpsc::UnboundedSender<KeeperExit>,
    ) -> Result<KeeperHandle, SchemaError> {
        let initial = definition.initial_state(&land_id);
        let mut tree = StateTree::new(definition.schema().clone(), initial)?;
        tree.set_dirty_tracking(definition.config().enable_dirty_tracking);

        let recorder = recording_dir.map(|dir| {
            let snapshot = tree.current_snapshot();
            Recorder::create(
                dir,
                &land_id,
                definition.config(),
                state_hash(&snapshot.root, definition.schema()),
                clock.epoch_ms(),
            )
        });

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let mut keeper = Self {
            land_id: land_id.clone(),
            definition,
            tree,
            queue: PendingQueue::new(),
            sync: SyncEngine::new(),
            sessions: HashMap::new(),
            players: HashMap::new(),
            recorder,
            clock,
            rx,
            exit_tx,
            empty_since: None,
            ever_joined: false,
            stop_reply: None,
        };
        keeper.queue.enqueue(
            ItemPayload::Lifecycle {
                kind: Lifecycle::Initialized,
                session_id: None,
                player_id: None,
            },
            1,
        );

        let handle = KeeperHandle { land_id: land_id.clone(), tx };
        tokio::spawn(async move {
            keeper.run().await;
        });
        tracing::info!(land = %land_id, "keeper spawned");
        Ok(handle)
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.definition.config().tick_period());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; skip it so tick 1
        // happens one period after spawn.
        ticker.tick().await;

        enum Wake {
            Tick,
            Msg(Option<KeeperMsg>),
        }

        let mut failed = false;
        loop {
            let wake = tokio::select! {
                _ = ticker.tick() => Wake::Tick,
                msg = self.rx.recv() => Wake::Msg(msg),
            };
            match wake {
                Wake::Tick => {
                    if let Err(fault) = self.run_tick().await {
                        tracing::error!(land = %self.land_id, error = %fault, "engine invariant violation, aborting land");
                        failed = true;
                        break;
                    }
                    if self.grace_expired() {
                        tracing::info!(land = %self.land_id, "empty grace expired");
                        break;
                    }
                }
                Wake::Msg(None) => break,
                Wake::Msg(Some(KeeperMsg::Stop { reply })) => {
                    self.stop_reply = reply;
                    break;
                }
                Wake::Msg(Some(msg)) => self.handle_msg(msg),
            }
        }
        self.finalize(failed);
    }

    fn handle_msg(&mut self, msg: KeeperMsg) {
        match msg {
            KeeperMsg::Join { request, out, reply } => self.handle_join(request, out, reply),
            KeeperMsg::Leave { session_id } => self.handle_leave(session_id),
            KeeperMsg::Action { session_id, request_id, type_id, payload } => {
                if self.sessions.contains_key(&session_id) {
                    self.queue.enqueue(
                        ItemPayload::Action {
                            session_id,
                            player_id: self.player_of(&session_id),
                            request_id,
                            type_id,
                            payload,
                        },
                        self.tree.tick_id() + 1,
                    );
                }
            }
            KeeperMsg::ClientEvent { session_id, type_id, payload } => {
                if self.sessions.contains_key(&session_id) {
                    self.queue.enqueue(
                        ItemPayload::ClientEvent {
                            session_id,
                            player_id: self.player_of(&session_id),
                            type_id,
                            payload,
                        },
                        self.tree.tick_id() + 1,
                    );
                }
            }
            KeeperMsg::Flush => self.flush_state(self.tree.tick_id()),
            KeeperMsg::AdminSnapshot { reply } => {
                let snapshot = self.tree.current_snapshot();
                let view =
                    land_core::project(&snapshot.root, self.definition.schema(), Visibility::Authoritative);
                let _ = reply.send(view);
            }
            KeeperMsg::Stop { .. } => {
                // Handled in the select loop; unreachable here.
            }
        }
    }

    fn player_of(&self, session_id: &SessionId) -> PlayerId {
        self.sessions
            .get(session_id)
            .map(|entry| entry.recipient.player_id.clone())
            .unwrap_or_else(|| PlayerId::new(""))
    }

    fn handle_join(
        &mut self,
        request: JoinRequest,
        out: mpsc::Sender<Outbound>,
        reply: oneshot::Sender<Result<JoinGrant, ClientError>>,
    ) {
        let player_id = request.identity.player_id.clone();

        // Reconnect: evict the previous connection of this player without
        // surfacing a leave; business logic observes continuous presence.
        let evicted = match self.players.get(&player_id).copied() {
            Some(old_session) => {
                if let Some(mut old) = self.sessions.remove(&old_session) {
                    self.sync.remove_session(&old_session);
                    let close = ServerFrame::Close {
                        error: ClientError::new(
                            codes::SESSION_REPLACED,
                            "another connection joined for this player",
                        ),
                    };
                    if let Ok(bytes) =
                        encode_server_frame(&close, self.definition.path_table(), &mut old.slots)
                    {
                        let _ = old.out.try_send(Outbound::Close(Bytes::from(bytes)));
                    }
                    tracing::info!(land = %self.land_id, player = %player_id, "evicted previous session");
                }
                true
            }
            None => false,
        };

        if !evicted {
            let snapshot = self.tree.current_snapshot();
            if let Err(error) = self.definition.check_join(&request, &snapshot.root) {
                let _ = reply.send(Err(error));
                return;
            }
        }

        let session_id = SessionId::new();
        let recipient = Recipient {
            session_id,
            player_id: player_id.clone(),
            land_id: self.land_id.clone(),
        };
        self.sync.add_session(recipient.clone());

        let snapshot = self.tree.current_snapshot();
        let first = self
            .sync
            .first_sync(&session_id, &snapshot.root, self.definition.schema())
            .unwrap_or_else(|| StateValue::Map(Default::default()));

        let mut entry = SessionEntry { recipient, out, slots: SlotTable::new() };
        let ack = ServerFrame::JoinAck {
            request_id: request.request_id,
            land_id: self.land_id.clone(),
            player_id: player_id.clone(),
            session_id,
            tick_id: snapshot.tick_id,
            snapshot: first,
        };
        match encode_server_frame(&ack, self.definition.path_table(), &mut entry.slots) {
            Ok(bytes) => {
                let _ = entry.out.try_send(Outbound::Frame(Bytes::from(bytes)));
            }
            Err(e) => {
                tracing::warn!(land = %self.land_id, error = %e, "join ack encode failed");
            }
        }

        self.sessions.insert(session_id, entry);
        self.players.insert(player_id.clone(), session_id);
        self.empty_since = None;
        self.ever_joined = true;

        if !evicted {
            self.queue.enqueue(
                ItemPayload::Lifecycle {
                    kind: Lifecycle::Joined,
                    session_id: Some(session_id),
                    player_id: Some(player_id.clone()),
                },
                self.tree.tick_id() + 1,
            );
        }

        tracing::info!(land = %self.land_id, player = %player_id, session = %session_id, "session joined");
        let _ = reply.send(Ok(JoinGrant {
            session_id,
            player_id,
            land_id: self.land_id.clone(),
        }));
    }

    fn handle_leave(&mut self, session_id: SessionId) {
        let Some(entry) = self.sessions.remove(&session_id) else { return };
        let player_id = entry.recipient.player_id.clone();
        // Only unbind the player when this session is still theirs (an
        // evicted session's leave must not unbind the replacement).
        if self.players.get(&player_id) == Some(&session_id) {
            self.players.remove(&player_id);
        }
        self.sync.remove_session(&session_id);
        self.queue.enqueue(
            ItemPayload::Lifecycle {
                kind: Lifecycle::Left,
                session_id: Some(session_id),
                player_id: Some(player_id.clone()),
            },
            self.tree.tick_id() + 1,
        );
        if self.sessions.is_empty() {
            self.empty_since = Some(self.clock.now());
        }
        tracing::info!(land = %self.land_id, player = %player_id, session = %session_id, "session left");
    }

    async fn run_tick(&mut self) -> Result<(), EngineFault> {
        let tick_id = self.tree.advance_tick();
        let items = self.queue.drain_due(tick_id);

        let mut resolver_names = BTreeSet::new();
        for item in &items {
            let resolvers = match &item.payload {
                ItemPayload::Action { type_id, .. } => {
                    self.definition.action(type_id).map(|spec| spec.resolvers.clone())
                }
                ItemPayload::ClientEvent { type_id, .. } => {
                    self.definition.event(type_id).map(|spec| spec.resolvers.clone())
                }
                _ => None,
            };
            if let Some(resolvers) = resolvers {
                resolver_names.extend(resolvers);
            }
        }
        if let Some(spec) = self.definition.on_tick() {
            resolver_names.extend(spec.resolvers.iter().cloned());
        }

        let outputs = if resolver_names.is_empty() {
            ResolverOutputs::new()
        } else {
            let ctx = ResolverCtx {
                land_id: self.land_id.clone(),
                tick_id,
                snapshot: self.tree.current_snapshot(),
                cancel: CancellationToken::new(),
            };
            run_resolvers(
                &self.definition,
                &resolver_names,
                &ctx,
                self.definition.config().tick_deadline(),
            )
            .await
        };

        let outcome = execute_items(
            &mut self.tree,
            &self.definition,
            &self.land_id,
            tick_id,
            &items,
            &outputs,
        )?;

        self.send_responses(&outcome);
        self.flush_state(tick_id);
        self.send_events(&outcome);
        self.record_frame(tick_id, &items, &outputs, &outcome.events);
        Ok(())
    }

    fn send_responses(&mut self, outcome: &TickOutcome) {
        for response in &outcome.responses {
            let frame = match &response.result {
                Ok(payload) => ServerFrame::action_ok(response.request_id, payload.clone()),
                Err(error) => ServerFrame::action_err(response.request_id, error.clone()),
            };
            self.send_frame(&response.session_id, &frame);
        }
        for (session_id, error) in &outcome.event_errors {
            let payload = serde_value_of(error);
            let frame =
                ServerFrame::ServerEvent { type_id: codes::EVENT_ERROR.to_string(), payload };
            self.send_frame(session_id, &frame);
        }
    }

    fn send_events(&mut self, outcome: &TickOutcome) {
        if outcome.events.is_empty() {
            return;
        }
        let targets: Vec<(SessionId, PlayerId)> = self
            .sessions
            .values()
            .map(|entry| (entry.recipient.session_id, entry.recipient.player_id.clone()))
            .collect();
        for event in &outcome.events {
            for (session_id, player_id) in &targets {
                if event.matches(session_id, player_id) {
                    let frame = ServerFrame::ServerEvent {
                        type_id: event.type_id.clone(),
                        payload: event.payload.clone(),
                    };
                    self.send_frame(session_id, &frame);
                }
            }
        }
    }

    /// Diff every session against its cache and push updates.
    fn flush_state(&mut self, tick_id: u64) {
        if self.sessions.is_empty() {
            let _ = self.tree.take_dirty();
            return;
        }
        // `use_snapshot_for_sync` off forces the plain full-walk diff; the
        // recorder is drained either way so toggling cannot change output.
        let dirty = if self.definition.config().use_snapshot_for_sync {
            self.tree.take_dirty()
        } else {
            let _ = self.tree.take_dirty();
            land_core::DirtySet::Disabled
        };
        let snapshot = self.tree.current_snapshot();
        let schema = self.definition.schema().clone();

        // Encode-once only pays off with multiple recipients; a lone
        // session gets an ordinary per-session diff.
        if self.definition.broadcast_only() && self.sessions.len() > 1 {
            let flush = self.sync.flush_shared(&snapshot.root, &schema);
            if let Some(projection) = &flush.projection {
                for session_id in &flush.first_targets {
                    let frame =
                        ServerFrame::StateFirst { tick_id, snapshot: projection.clone() };
                    self.send_frame(session_id, &frame);
                }
                if !flush.patches.is_empty() {
                    // Encode once, replicate bytes.
                    let frame = ServerFrame::BroadcastUpdate {
                        tick_id,
                        patches: flush.patches.clone(),
                    };
                    let mut throwaway = SlotTable::new();
                    match encode_server_frame(&frame, self.definition.path_table(), &mut throwaway)
                    {
                        Ok(bytes) => {
                            let bytes = Bytes::from(bytes);
                            for session_id in &flush.diff_targets {
                                self.send_bytes(session_id, bytes.clone());
                            }
                        }
                        Err(e) => {
                            tracing::warn!(land = %self.land_id, error = %e, "broadcast encode failed");
                        }
                    }
                }
            }
            return;
        }

        for session_id in self.sync.session_ids() {
            let Some(update) = self.sync.sync_session(&session_id, &snapshot.root, &schema, &dirty)
            else {
                continue;
            };
            match update {
                SyncUpdate::First(projection) => {
                    let frame = ServerFrame::StateFirst { tick_id, snapshot: projection };
                    self.send_frame(&session_id, &frame);
                }
                SyncUpdate::Diff(patches) if !patches.is_empty() => {
                    let frame = ServerFrame::StateDiff { tick_id, patches };
                    self.send_frame(&session_id, &frame);
                }
                SyncUpdate::Diff(_) => {}
            }
        }
    }

    fn record_frame(
        &mut self,
        tick_id: u64,
        items: &[PendingItem],
        outputs: &ResolverOutputs,
        events: &[ServerEvent],
    ) {
        let Some(recorder) = &mut self.recorder else { return };
        let snapshot = self.tree.current_snapshot();
        let hash = state_hash(&snapshot.root, self.definition.schema());
        recorder.record(RecordingFrame::capture(tick_id, items, outputs, events, hash));
    }

    fn send_frame(&mut self, session_id: &SessionId, frame: &ServerFrame) {
        let Some(entry) = self.sessions.get_mut(session_id) else { return };
        match encode_server_frame(frame, self.definition.path_table(), &mut entry.slots) {
            Ok(bytes) => self.send_bytes(session_id, Bytes::from(bytes)),
            Err(e) => {
                tracing::warn!(land = %self.land_id, session = %session_id, error = %e, "frame encode failed");
            }
        }
    }

    fn send_bytes(&mut self, session_id: &SessionId, bytes: Bytes) {
        let Some(entry) = self.sessions.get(session_id) else { return };
        match entry.out.try_send(Outbound::Frame(bytes)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    land = %self.land_id,
                    session = %session_id,
                    code = codes::SLOW_CONSUMER,
                    "outbound buffer full, dropping session"
                );
                self.drop_session(*session_id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Session task is already gone; its Leave is in flight.
            }
        }
    }

    /// Forcible drop for slow consumers. The session observes its channel
    /// closing and shuts the socket; business logic sees a normal leave.
    fn drop_session(&mut self, session_id: SessionId) {
        self.handle_leave(session_id);
    }

    fn grace_expired(&self) -> bool {
        if !self.ever_joined {
            return false;
        }
        match self.empty_since {
            Some(since) => {
                self.clock.now().duration_since(since) >= self.definition.config().empty_grace()
            }
            None => false,
        }
    }

    fn finalize(mut self, failed: bool) {
        // Release sessions with a close frame.
        let session_ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for session_id in session_ids {
            if let Some(mut entry) = self.sessions.remove(&session_id) {
                let code = if failed { codes::LAND_FAILED } else { codes::LAND_CLOSED };
                let close =
                    ServerFrame::Close { error: ClientError::new(code, "land shut down") };
                if let Ok(bytes) =
                    encode_server_frame(&close, self.definition.path_table(), &mut entry.slots)
                {
                    let _ = entry.out.try_send(Outbound::Close(Bytes::from(bytes)));
                }
            }
        }

        if let Some(hook) = self.definition.on_finalize() {
            let snapshot = self.tree.current_snapshot();
            hook(&snapshot.root);
        }
        if let Some(recorder) = &mut self.recorder {
            recorder.finalize();
        }
        if let Some(reply) = self.stop_reply.take() {
            let _ = reply.send(());
        }
        let _ = self.exit_tx.send(KeeperExit { land_id: self.land_id.clone(), failed });
        tracing::info!(land = %self.land_id, failed, "keeper finalized");
    }
}

fn serde_value_of(error: &ClientError) -> StateValue {
    StateValue::map([
        ("code", StateValue::from(error.code.clone())),
        ("message", StateValue::from(error.message.clone())),
    ])
}

#[cfg(test)]
#[path = "keeper_tests.rs"]
mod tests;
