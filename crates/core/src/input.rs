// SPDX-License-Identifier: MIT

//! Pending inputs: the tagged union the keeper schedules and records.
//!
//! Every input to a Land carries a monotonic `sequence` and a
//! `resolved_at_tick` target; `(resolved_at_tick, sequence)` is the total
//! order the keeper executes in and replay must reproduce.

use crate::identity::{PlayerId, SessionId};
use crate::value::StateValue;
use serde::{Deserialize, Serialize};

/// Session lifecycle transitions that reach handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Initialized,
    Joined,
    Left,
}

/// Payload of one scheduled input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ItemPayload {
    #[serde(rename = "action")]
    Action {
        session_id: SessionId,
        player_id: PlayerId,
        request_id: u64,
        type_id: String,
        payload: StateValue,
    },

    #[serde(rename = "client_event")]
    ClientEvent {
        session_id: SessionId,
        player_id: PlayerId,
        type_id: String,
        payload: StateValue,
    },

    #[serde(rename = "lifecycle")]
    Lifecycle {
        kind: Lifecycle,
        /// Absent for `initialized`, which has no originating session.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
    },

    #[serde(rename = "tick")]
    Tick,
}

impl ItemPayload {
    /// Type id used to look up the handler, when the payload has one.
    pub fn type_id(&self) -> Option<&str> {
        match self {
            Self::Action { type_id, .. } | Self::ClientEvent { type_id, .. } => Some(type_id),
            _ => None,
        }
    }

    /// Session the item originated from, when any.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Action { session_id, .. } | Self::ClientEvent { session_id, .. } => {
                Some(session_id)
            }
            Self::Lifecycle { session_id, .. } => session_id.as_ref(),
            Self::Tick => None,
        }
    }
}

/// One scheduled input with its position in the Land's total order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingItem {
    pub sequence: u64,
    pub resolved_at_tick: u64,
    pub payload: ItemPayload,
}

impl PendingItem {
    /// Ordering key: `(resolved_at_tick, sequence)`.
    pub fn order_key(&self) -> (u64, u64) {
        (self.resolved_at_tick, self.sequence)
    }
}

#[cfg(test)]
#[path = "input_tests.rs"]
mod tests;
