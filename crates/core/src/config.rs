// SPDX-License-Identifier: MIT

//! Per-Land runtime configuration.
//!
//! Serialized into recording metadata so replay runs under the exact
//! configuration the live Land used.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one Land. All timeouts are per Land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandConfig {
    /// Tick rate in milliseconds.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// Resolver deadline per tick. Defaults to the tick period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_deadline_ms: Option<u64>,

    /// Join handshake deadline.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Grace period before an empty Land is destroyed.
    #[serde(default = "default_empty_grace_ms")]
    pub empty_grace_ms: u64,

    /// Frames buffered before the recorder flushes.
    #[serde(default = "default_recording_flush_every")]
    pub recording_flush_every: u32,

    /// Per-session outbound frame buffer. Overflow drops the session.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Toggles the dirty-field recorder.
    #[serde(default = "default_true")]
    pub enable_dirty_tracking: bool,

    /// Enables the combined single-walk snapshot/diff path.
    #[serde(default = "default_true")]
    pub use_snapshot_for_sync: bool,

    /// Allow joins without an instance id to create a fresh Land.
    #[serde(default = "default_true")]
    pub allow_instance_creation: bool,
}

fn default_tick_period_ms() -> u64 {
    50
}

fn default_join_timeout_ms() -> u64 {
    10_000
}

fn default_empty_grace_ms() -> u64 {
    30_000
}

fn default_recording_flush_every() -> u32 {
    60
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for LandConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            tick_deadline_ms: None,
            join_timeout_ms: default_join_timeout_ms(),
            empty_grace_ms: default_empty_grace_ms(),
            recording_flush_every: default_recording_flush_every(),
            outbound_buffer: default_outbound_buffer(),
            enable_dirty_tracking: true,
            use_snapshot_for_sync: true,
            allow_instance_creation: true,
        }
    }
}

impl LandConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Resolver deadline; equals the tick period unless overridden.
    pub fn tick_deadline(&self) -> Duration {
        Duration::from_millis(self.tick_deadline_ms.unwrap_or(self.tick_period_ms))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn empty_grace(&self) -> Duration {
        Duration::from_millis(self.empty_grace_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
