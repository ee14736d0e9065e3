// SPDX-License-Identifier: MIT

//! Frame opcodes.
//!
//! The first element of every frame is one of these small integers. The
//! list here is authoritative; gaps are reserved.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message kind selector, the first element of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// C→S: join a Land.
    Join = 1,
    /// S→C: join accepted; carries the initial snapshot.
    JoinAck = 2,
    /// S→C: join rejected.
    JoinError = 3,
    /// C→S: invoke an action.
    Action = 4,
    /// S→C: action outcome for a request id.
    ActionResponse = 5,
    /// C→S: fire-and-forget client event.
    ClientEvent = 6,
    /// S→C: domain event emitted by a handler.
    ServerEvent = 7,
    /// S→C: first state update (full snapshot).
    StateFirst = 8,
    /// S→C: incremental state update (patches).
    StateDiff = 9,
    /// S→C: close with a structured error.
    Close = 99,
    /// S→C: shared payload encoded once per tick for all recipients.
    BroadcastUpdate = 107,
}

/// Unknown opcode on the wire.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown opcode {0}")]
pub struct UnknownOpcode(pub u64);

impl TryFrom<u64> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(value: u64) -> Result<Self, UnknownOpcode> {
        match value {
            1 => Ok(Self::Join),
            2 => Ok(Self::JoinAck),
            3 => Ok(Self::JoinError),
            4 => Ok(Self::Action),
            5 => Ok(Self::ActionResponse),
            6 => Ok(Self::ClientEvent),
            7 => Ok(Self::ServerEvent),
            8 => Ok(Self::StateFirst),
            9 => Ok(Self::StateDiff),
            99 => Ok(Self::Close),
            107 => Ok(Self::BroadcastUpdate),
            other => Err(UnknownOpcode(other)),
        }
    }
}

#[cfg(test)]
#[path = "opcode_tests.rs"]
mod tests;
