// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! land-wire: binary wire protocol for the Land state engine.
//!
//! Frames are opcode-first tagged arrays serialized as MessagePack. Stable
//! paths known at schema time compress to 32-bit hashes; mapping keys
//! discovered at runtime compress to per-session slot references after a
//! one-time announcement. Given identical inputs and slot table state the
//! codec is byte-deterministic, which is the precondition for content-hash
//! verification during replay.

pub mod codec;
pub mod frame;
pub mod opcode;
pub mod pathhash;
pub mod slot;

pub use codec::{decode_client_frame, decode_server_frame, encode_client_frame, encode_server_frame, CodecError};
pub use frame::{ActionFrame, ClientEventFrame, ClientFrame, JoinFrame, ServerFrame};
pub use opcode::Opcode;
pub use pathhash::{fnv1a32, PathTable, PathTableError};
pub use slot::SlotTable;
