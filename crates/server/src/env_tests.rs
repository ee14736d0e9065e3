// SPDX-License-Identifier: MIT

use super::*;

// Env tests mutate process-global state; each uses a distinct variable so
// they stay independent under the parallel test runner.

#[test]
fn apply_env_overrides_tick_period() {
    std::env::set_var("LAND_TICK_PERIOD_MS", "16");
    let mut config = LandConfig::default();
    apply_env(&mut config);
    assert_eq!(config.tick_period_ms, 16);
    std::env::remove_var("LAND_TICK_PERIOD_MS");
}

#[test]
fn bool_options_accept_common_spellings() {
    std::env::set_var("LAND_ENABLE_DIRTY_TRACKING", "off");
    let mut config = LandConfig::default();
    apply_env(&mut config);
    assert!(!config.enable_dirty_tracking);

    std::env::set_var("LAND_ENABLE_DIRTY_TRACKING", "bogus");
    let mut config = LandConfig::default();
    apply_env(&mut config);
    // Unparseable values fall back to the default.
    assert!(config.enable_dirty_tracking);
    std::env::remove_var("LAND_ENABLE_DIRTY_TRACKING");
}

#[test]
fn defaults_apply_without_env() {
    let mut config = LandConfig::default();
    apply_env(&mut config);
    assert_eq!(config.recording_flush_every, 60);
    assert!(config.use_snapshot_for_sync);
}

#[test]
fn listen_addr_defaults_to_loopback() {
    assert!(listen_addr().starts_with("127.0.0.1:"));
}
