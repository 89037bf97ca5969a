//! Integration Tests: environment-driven configuration
//!
//! These tests verify:
//! 1. `ATLAS_VARIANT` selects the preset
//! 2. Individual `ATLAS_*` variables override the preset
//! 3. Malformed values are rejected as configuration errors

use atlas::{AtlasError, MatchPolicy, NodeConfig, RecordLayout, Variant};
use once_cell::sync::Lazy;
use std::sync::Mutex;
use std::time::Duration;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const VARS: &[&str] = &[
    "ATLAS_VARIANT",
    "ATLAS_APP",
    "ATLAS_ROOT",
    "ATLAS_RSSI_THRESHOLD",
    "ATLAS_SCAN_WINDOW_MS",
    "ATLAS_MATCH",
    "ATLAS_TOPIC_PREFIX",
    "ATLAS_UTC_OFFSET",
];

/// Serialize env access and start from a clean slate
fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    for var in VARS {
        std::env::remove_var(var);
    }
    guard
}

#[test]
fn empty_environment_is_standalone() {
    let _guard = lock_env();
    let config = NodeConfig::from_env().expect("config");
    assert_eq!(config.variant, Variant::Standalone);
    assert_eq!(config.app, "atlas");
    assert_eq!(config.rssi_threshold, -75);
    assert_eq!(config.layout, RecordLayout::Combined);
    assert!(!config.remote_sync);
}

#[test]
fn variant_selects_preset_then_overrides_apply() {
    let _guard = lock_env();
    std::env::set_var("ATLAS_VARIANT", "slave");
    std::env::set_var("ATLAS_APP", "gate-b");
    std::env::set_var("ATLAS_RSSI_THRESHOLD", "-85");
    std::env::set_var("ATLAS_SCAN_WINDOW_MS", "1500");
    std::env::set_var("ATLAS_MATCH", "label");
    std::env::set_var("ATLAS_TOPIC_PREFIX", "campus/north");

    let config = NodeConfig::from_env().expect("config");
    assert_eq!(config.variant, Variant::Distributed);
    assert_eq!(config.app, "gate-b");
    assert_eq!(config.rssi_threshold, -85);
    assert_eq!(config.scan_window, Duration::from_millis(1500));
    assert_eq!(config.match_policy, MatchPolicy::LabelFallback);
    assert_eq!(config.topic_prefix, "campus/north");
    // untouched preset values
    assert_eq!(config.layout, RecordLayout::Split);
    assert!(config.remote_sync);
}

#[test]
fn blank_values_are_ignored() {
    let _guard = lock_env();
    std::env::set_var("ATLAS_APP", "   ");
    std::env::set_var("ATLAS_RSSI_THRESHOLD", "");

    let config = NodeConfig::from_env().expect("config");
    assert_eq!(config.app, "atlas");
    assert_eq!(config.rssi_threshold, -75);
}

#[test]
fn malformed_values_are_config_errors() {
    let _guard = lock_env();
    let cases = [
        ("ATLAS_VARIANT", "cluster"),
        ("ATLAS_RSSI_THRESHOLD", "loud"),
        ("ATLAS_SCAN_WINDOW_MS", "-5"),
        ("ATLAS_MATCH", "fuzzy"),
        ("ATLAS_UTC_OFFSET", "+7h"),
    ];
    for (var, value) in cases {
        std::env::set_var(var, value);
        let err = NodeConfig::from_env().expect_err(var);
        assert!(matches!(err, AtlasError::Config(ref msg) if msg.contains(var)), "{var}: {err}");
        assert!(!err.is_fatal());
        std::env::remove_var(var);
    }
}

#[test]
fn zero_scan_window_fails_validation() {
    let _guard = lock_env();
    std::env::set_var("ATLAS_SCAN_WINDOW_MS", "0");
    assert!(matches!(NodeConfig::from_env(), Err(AtlasError::Config(_))));
}

#[test]
fn distributed_needs_a_topic_prefix() {
    let _guard = lock_env();
    std::env::set_var("ATLAS_VARIANT", "distributed");
    std::env::set_var("ATLAS_TOPIC_PREFIX", "/");
    assert!(matches!(NodeConfig::from_env(), Err(AtlasError::Config(_))));
}
