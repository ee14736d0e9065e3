// SPDX-License-Identifier: MIT

//! Identity resolution contract.
//!
//! Authentication itself (JWT verification, session stores) lives outside
//! the engine; the transport only needs a join frame turned into a
//! `ClientIdentity` or a structured rejection. The default resolver
//! accepts the caller-provided player id and mints guests otherwise.

use async_trait::async_trait;
use land_core::{codes, ClientError, ClientIdentity, PlayerId};
use land_wire::JoinFrame;

/// Turns a join frame into an authenticated principal or a guest.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Reject with `AUTH_FAILED` to close the connection.
    async fn resolve(&self, join: &JoinFrame) -> Result<ClientIdentity, ClientError>;
}

/// Permissive default: trust the provided player id, mint guests.
pub struct GuestIdentity;

#[async_trait]
impl IdentityResolver for GuestIdentity {
    async fn resolve(&self, join: &JoinFrame) -> Result<ClientIdentity, ClientError> {
        match &join.player_id {
            Some(player_id) if !player_id.is_empty() => {
                let mut identity = ClientIdentity::player(player_id.as_str());
                identity.client_id = join.client_id.clone().map(Into::into);
                Ok(identity)
            }
            _ => Ok(ClientIdentity::guest(format!("guest-{}", nanoid::nanoid!(12)))),
        }
    }
}

/// Resolver that requires a caller-provided player id.
pub struct RequirePlayerId;

#[async_trait]
impl IdentityResolver for RequirePlayerId {
    async fn resolve(&self, join: &JoinFrame) -> Result<ClientIdentity, ClientError> {
        match &join.player_id {
            Some(player_id) if !player_id.is_empty() => {
                Ok(ClientIdentity::player(PlayerId::new(player_id.as_str())))
            }
            _ => Err(ClientError::new(codes::AUTH_FAILED, "player id required")),
        }
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
