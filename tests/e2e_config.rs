//! E2E tests for persistent configuration
//!
//! Tests config round-trip, defaults, compatibility with existing option
//! files, and validation at loop construction.

use scopedaq::audio::source::ReplaySource;
use scopedaq::config::ConfigError;
use scopedaq::{AcquisitionError, AcquisitionLoop, Edge, Frame, OsciConfig};

fn replay(frame_size: usize) -> ReplaySource<i16> {
    ReplaySource::new(vec![Frame::from_channels(vec![vec![0; frame_size]]); 4], 44100)
}

#[test]
fn test_config_roundtrip_all_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let config = OsciConfig {
        device: Some("USB Audio CODEC".to_string()),
        sampling_rate: 96000,
        number_of_samples: 2048,
        channels: vec![2, 1],
        trg_active: true,
        trg_chan: 1,
        trg_threshold: -3000.0,
        trg_hysteresis: Some(-200.0),
        trg_falling: true,
        pulse_filter: true,
        overshoot_fraction: 0.3,
        max_peak_separation: Some(25),
        range: 8192.0,
        window_length: 256,
        pre_trigger_fraction: 0.25,
        ring_slots: 4,
        max_consecutive_errors: 10,
    };
    config.save(&path).unwrap();

    let loaded = OsciConfig::load(&path);
    assert_eq!(loaded, config);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_config_uses_option_names() {
    let config = OsciConfig {
        trg_active: true,
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    for key in ["\"trgActive\"", "\"trgChan\"", "\"trgThreshold\"", "\"trgFalling\""] {
        assert!(json.contains(key), "{} missing from {}", key, json);
    }
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"trgActive": true, "trgThreshold": 5000}"#).unwrap();

    let config = OsciConfig::load(&path);
    assert!(config.trg_active);
    assert_eq!(config.sampling_rate, 44100);
    assert_eq!(config.number_of_samples, 1024);
    assert_eq!(config.hysteresis(), 625);
    assert_eq!(config.edge(), Edge::Rising);
    assert_eq!(config.pre_trigger_samples(), 50);
}

#[test]
fn test_corrupt_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert_eq!(OsciConfig::load(&path), OsciConfig::default());
}

#[test]
fn test_default_path_ends_with_app_dir() {
    let path = OsciConfig::default_path();
    assert!(path.ends_with("scopedaq/config.json"));
}

#[test]
fn test_loop_rejects_invalid_config() {
    let config = OsciConfig {
        trg_active: true,
        trg_threshold: 5000.0,
        trg_hysteresis: Some(5000.0),
        number_of_samples: 64,
        ..Default::default()
    };
    let result = AcquisitionLoop::new(config, replay(64));
    assert!(matches!(
        result,
        Err(AcquisitionError::Config(ConfigError::HysteresisSide { .. }))
    ));
}

#[test]
fn test_loop_rejects_window_larger_than_ring() {
    let config = OsciConfig {
        trg_active: true,
        trg_threshold: 5000.0,
        number_of_samples: 64,
        window_length: 300,
        ..Default::default()
    };
    let result = AcquisitionLoop::new(config, replay(64));
    assert!(matches!(
        result,
        Err(AcquisitionError::Config(ConfigError::WindowTooLong { .. }))
    ));

    // a fourth slot gives room for the longer pre-trigger part
    let config = OsciConfig {
        trg_active: true,
        trg_threshold: 5000.0,
        number_of_samples: 64,
        window_length: 120,
        ring_slots: 4,
        ..Default::default()
    };
    assert!(AcquisitionLoop::new(config, replay(64)).is_ok());
}

#[test]
fn test_loop_rejects_mismatched_source() {
    let config = OsciConfig {
        number_of_samples: 128,
        ..Default::default()
    };
    let result = AcquisitionLoop::new(config, replay(64));
    assert!(matches!(
        result,
        Err(AcquisitionError::SourceMismatch {
            source_frame: 64,
            frame_size: 128,
            ..
        })
    ));
}

#[test]
fn test_loop_rejects_zero_error_limit() {
    let config = OsciConfig {
        number_of_samples: 64,
        max_consecutive_errors: 0,
        ..Default::default()
    };
    let result = AcquisitionLoop::new(config, replay(64));
    assert!(matches!(
        result,
        Err(AcquisitionError::Config(ConfigError::MaxConsecutiveErrors))
    ));
}
