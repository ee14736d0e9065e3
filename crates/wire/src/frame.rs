// SPDX-License-Identifier: MIT

//! Frame envelopes for both directions.
//!
//! These are the decoded forms; `codec` maps them to and from the tagged
//! MessagePack arrays on the wire.

use land_core::{ClientError, LandId, Patch, PlayerId, SessionId, StateValue};

/// C→S join request.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinFrame {
    pub request_id: u64,
    pub land_type: String,
    /// Absent to let the router create a fresh instance (when allowed).
    pub instance_id: Option<String>,
    pub player_id: Option<String>,
    pub client_id: Option<String>,
    pub metadata: StateValue,
}

/// C→S action invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionFrame {
    pub request_id: u64,
    pub land_id: LandId,
    pub type_id: String,
    pub payload: StateValue,
}

/// C→S fire-and-forget event.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientEventFrame {
    pub land_id: LandId,
    pub type_id: String,
    pub payload: StateValue,
}

/// Every frame a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Join(JoinFrame),
    Action(ActionFrame),
    ClientEvent(ClientEventFrame),
}

/// Every frame the server may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    JoinAck {
        request_id: u64,
        land_id: LandId,
        player_id: PlayerId,
        session_id: SessionId,
        tick_id: u64,
        snapshot: StateValue,
    },
    JoinError {
        request_id: u64,
        error: ClientError,
    },
    ActionResponse {
        request_id: u64,
        ok: bool,
        payload: Option<StateValue>,
        error: Option<ClientError>,
    },
    ServerEvent {
        type_id: String,
        payload: StateValue,
    },
    StateFirst {
        tick_id: u64,
        snapshot: StateValue,
    },
    StateDiff {
        tick_id: u64,
        patches: Vec<Patch>,
    },
    BroadcastUpdate {
        tick_id: u64,
        patches: Vec<Patch>,
    },
    Close {
        error: ClientError,
    },
}

impl ServerFrame {
    pub fn action_ok(request_id: u64, payload: StateValue) -> Self {
        Self::ActionResponse { request_id, ok: true, payload: Some(payload), error: None }
    }

    pub fn action_err(request_id: u64, error: ClientError) -> Self {
        Self::ActionResponse { request_id, ok: false, payload: None, error: Some(error) }
    }
}
