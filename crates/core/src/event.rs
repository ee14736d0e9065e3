// SPDX-License-Identifier: MIT

//! Server-emitted domain events and their recipient targets.

use crate::identity::{PlayerId, SessionId};
use crate::value::StateValue;
use serde::{Deserialize, Serialize};

/// Who an emitted event is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventTarget {
    /// Every session observing the Land.
    All,
    /// The single active session of one player.
    Player { player_id: PlayerId },
    /// One specific session.
    Session { session_id: SessionId },
}

/// A domain event emitted by a handler during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    pub type_id: String,
    pub payload: StateValue,
    pub target: EventTarget,
}

impl ServerEvent {
    pub fn broadcast(type_id: impl Into<String>, payload: impl Into<StateValue>) -> Self {
        Self { type_id: type_id.into(), payload: payload.into(), target: EventTarget::All }
    }

    pub fn to_player(
        type_id: impl Into<String>,
        payload: impl Into<StateValue>,
        player_id: impl Into<PlayerId>,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            payload: payload.into(),
            target: EventTarget::Player { player_id: player_id.into() },
        }
    }

    pub fn to_session(
        type_id: impl Into<String>,
        payload: impl Into<StateValue>,
        session_id: SessionId,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            payload: payload.into(),
            target: EventTarget::Session { session_id },
        }
    }

    /// Does this event reach the given session?
    pub fn matches(&self, session_id: &SessionId, player_id: &PlayerId) -> bool {
        match &self.target {
            EventTarget::All => true,
            EventTarget::Player { player_id: target } => target == player_id,
            EventTarget::Session { session_id: target } => target == session_id,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
