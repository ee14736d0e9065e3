// SPDX-License-Identifier: MIT

//! Identity types for sessions, players and devices.
//!
//! `PlayerId` is the stable business identity that survives reconnects.
//! `ClientId` identifies one device/client instance and is optional.
//! `SessionId` is server-assigned, unique for the lifetime of one transport
//! connection, and never reused.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::define_id;
use crate::land::LandId;

define_id! {
    /// Server-assigned per-connection identity.
    pub struct SessionId("ses-");
}

macro_rules! string_identity {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_identity! {
    /// Stable business identity for a player. Carries across reconnects.
    pub struct PlayerId;
}

string_identity! {
    /// Device/client-instance identity, provided by the caller.
    pub struct ClientId;
}

/// Resolved identity of a connected client.
///
/// Produced by the host's identity resolution (authenticated principal or
/// guest) before the join reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub player_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    /// True when no credential was presented and a guest identity was minted.
    #[serde(default)]
    pub guest: bool,
}

impl ClientIdentity {
    pub fn player(player_id: impl Into<PlayerId>) -> Self {
        Self { player_id: player_id.into(), client_id: None, guest: false }
    }

    pub fn guest(player_id: impl Into<PlayerId>) -> Self {
        Self { player_id: player_id.into(), client_id: None, guest: true }
    }
}

/// Recipient descriptor used by the projector and the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    pub land_id: LandId,
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
