// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! land-engine: the deterministic per-Land runtime.
//!
//! A `LandKeeper` is the single serialization point for one Land: it owns
//! the state tree, the pending-input queue, the tick scheduler, the sync
//! engine and the recording sink. Keepers are independent actors, one
//! tokio task each, fed by a bounded mpsc inbox. Handlers run synchronously
//! against a working copy; resolvers are the only place asynchrony (and
//! host state) may enter, which is what makes recorded runs replayable.

#[cfg(test)]
pub(crate) mod test_fixtures;

pub mod definition;
pub mod exec;
pub mod keeper;
pub mod manager;
pub mod queue;
pub mod realm;
pub mod record;
pub mod replay;
pub mod resolver;
pub mod sync;

pub use definition::{
    HandlerCtx, HandlerError, JoinRequest, LandDefinition, LandDefinitionBuilder,
};
pub use exec::EngineFault;
pub use keeper::{JoinGrant, KeeperExit, KeeperHandle, KeeperMsg, LandKeeper, Outbound};
pub use manager::LandManager;
pub use queue::PendingQueue;
pub use realm::LandRealm;
pub use record::{Recorder, RecordingFile, RecordingFrame, RecordingMetadata, ResolverRecord};
pub use replay::{replay, verify, ReplayError, ReplayRun, VerifyReport};
pub use resolver::{
    LandRngResolver, Resolver, ResolverCtx, ResolverError, ResolverOutputs, TickClockResolver,
};
pub use sync::{SharedFlush, SyncEngine, SyncUpdate};
