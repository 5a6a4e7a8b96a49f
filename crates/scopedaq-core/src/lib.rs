//! ScopeDAQ Core - sound-card oscilloscope engine
//!
//! This library turns a continuous sound-card input stream into triggered
//! waveform events. It keeps a multi-frame capture ring so pre-trigger
//! samples survive the trigger, detects hysteresis-qualified edges, copies
//! fixed-length windows around each trigger and can filter detector pulses
//! by their bipolar shape.

pub mod audio;
pub mod config;
pub mod device;
pub mod sink;
pub mod stats;

pub use audio::acquisition::{AcqState, AcquisitionError, AcquisitionLoop, Event};
pub use audio::pulse::{PulseAnalyzer, PulseFeatures, Rejection};
pub use audio::sample::{Frame, Sample};
pub use audio::source::{CancelToken, DeviceError, FrameSource, ReadStatus};
pub use audio::trigger::{ArmState, Edge, TriggerConfig, TriggerDetector};
pub use config::{ConfigError, OsciConfig};
pub use device::Device;
pub use stats::store::StatsStore;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default frame size in samples per channel
pub const DEFAULT_FRAME_SIZE: usize = 1024;
