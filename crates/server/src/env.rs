// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the server crate.

use land_core::LandConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Listen address (`LAND_LISTEN_ADDR`, default loopback).
pub fn listen_addr() -> String {
    std::env::var("LAND_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:9087".to_string())
}

/// Handshake deadline before a session is bound to a Land
/// (`LAND_JOIN_TIMEOUT_MS`, default 10s).
pub fn join_timeout() -> Duration {
    std::env::var("LAND_JOIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}

/// Directory for re-evaluation recordings (`LAND_RECORDING_DIR`).
pub fn recording_dir() -> Option<PathBuf> {
    std::env::var("LAND_RECORDING_DIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

fn env_bool(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.as_str() {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Overlay recognized environment options onto a land configuration.
///
/// `LAND_TICK_PERIOD_MS`, `LAND_JOIN_TIMEOUT_MS`,
/// `LAND_RECORDING_FLUSH_EVERY`, `LAND_ENABLE_DIRTY_TRACKING`,
/// `LAND_USE_SNAPSHOT_FOR_SYNC`.
pub fn apply_env(config: &mut LandConfig) {
    if let Some(ms) = env_u64("LAND_TICK_PERIOD_MS") {
        config.tick_period_ms = ms;
    }
    if let Some(ms) = env_u64("LAND_JOIN_TIMEOUT_MS") {
        config.join_timeout_ms = ms;
    }
    if let Some(n) = env_u64("LAND_RECORDING_FLUSH_EVERY") {
        config.recording_flush_every = n as u32;
    }
    if let Some(enabled) = env_bool("LAND_ENABLE_DIRTY_TRACKING") {
        config.enable_dirty_tracking = enabled;
    }
    if let Some(enabled) = env_bool("LAND_USE_SNAPSHOT_FOR_SYNC") {
        config.use_snapshot_for_sync = enabled;
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
