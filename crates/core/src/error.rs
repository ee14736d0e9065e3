// SPDX-License-Identifier: MIT

//! Client-facing error taxonomy.
//!
//! Codes are stable identifiers suitable for client-side branching. The
//! registry is fixed at compile time; new codes are additions, never
//! renames.

use crate::value::StateValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable error codes.
pub mod codes {
    /// Malformed or undecodable frame; the session is closed.
    pub const INVALID_FRAME: &str = "INVALID_FRAME";
    /// Credentials invalid or missing where required; the session is closed.
    pub const AUTH_FAILED: &str = "AUTH_FAILED";
    /// Join rejected for an already-joined (player, land) pair.
    pub const ALREADY_JOINED: &str = "ALREADY_JOINED";
    /// Second join while the first handshake is still in flight.
    pub const ALREADY_JOINING: &str = "ALREADY_JOINING";
    /// Handshake did not complete within the join timeout.
    pub const JOIN_TIMEOUT: &str = "JOIN_TIMEOUT";
    /// The requested land type has no registered definition.
    pub const UNKNOWN_LAND_TYPE: &str = "UNKNOWN_LAND_TYPE";
    /// A named land instance was required but does not exist.
    pub const LAND_NOT_FOUND: &str = "LAND_NOT_FOUND";
    /// The Land was aborted by an engine invariant violation.
    pub const LAND_FAILED: &str = "LAND_FAILED";
    /// Action type id not present in the definition's registry.
    pub const ACTION_NOT_REGISTERED: &str = "ACTION_NOT_REGISTERED";
    /// Client event type id not present in the registry.
    pub const EVENT_NOT_REGISTERED: &str = "EVENT_NOT_REGISTERED";
    /// A resolver the item depends on failed; the handler did not run.
    pub const RESOLVER_FAILED: &str = "RESOLVER_FAILED";
    /// The handler itself returned an error or panicked.
    pub const HANDLER_FAILED: &str = "HANDLER_FAILED";
    /// The session's outbound buffer overflowed and it was dropped.
    pub const SLOW_CONSUMER: &str = "SLOW_CONSUMER";
    /// A transport write failed; the session is closed.
    pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
    /// Normal closure of the replaced connection after a reconnect.
    pub const SESSION_REPLACED: &str = "SESSION_REPLACED";
    /// Normal closure because the Land shut down.
    pub const LAND_CLOSED: &str = "LAND_CLOSED";
    /// Error frame kind for failed client event handlers.
    pub const EVENT_ERROR: &str = "event_error";
}

/// Structured error surfaced to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, StateValue>,
}

impl ClientError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into(), details: BTreeMap::new() }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn already_joined() -> Self {
        Self::new(codes::ALREADY_JOINED, "session is already joined to a land")
    }

    pub fn already_joining() -> Self {
        Self::new(codes::ALREADY_JOINING, "join handshake already in flight")
    }

    pub fn action_not_registered(type_id: &str) -> Self {
        Self::new(codes::ACTION_NOT_REGISTERED, format!("no action registered for {type_id:?}"))
            .with_detail("type_id", type_id)
    }

    pub fn event_not_registered(type_id: &str) -> Self {
        Self::new(codes::EVENT_NOT_REGISTERED, format!("no event registered for {type_id:?}"))
            .with_detail("type_id", type_id)
    }

    pub fn resolver_failed(resolver: &str, message: impl Into<String>) -> Self {
        Self::new(codes::RESOLVER_FAILED, message.into()).with_detail("resolver", resolver)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ClientError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
