// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! land-server: WebSocket transport for the Land state engine.
//!
//! Owns the listener, the per-connection session tasks and the join
//! handshake. Sessions route inbound frames to their keeper and forward
//! keeper-encoded outbound frames to the socket; the keeper never touches
//! a connection directly. A plain `GET /schema` on the same listener is
//! answered with the realm's schema document.

pub mod env;
pub mod identity;
pub mod server;
pub mod session;

pub use identity::{GuestIdentity, IdentityResolver};
pub use server::Server;

use tracing_subscriber::EnvFilter;

/// Initialize tracing from `LAND_LOG` (fallback `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LAND_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
