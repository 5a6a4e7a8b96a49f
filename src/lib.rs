//! ScopeDAQ - sound-card oscilloscope and pulse recorder
//!
//! This library re-exports the acquisition engine, configuration, sinks
//! and statistics from `scopedaq-core`.

pub use scopedaq_core::audio;
pub use scopedaq_core::config;
pub use scopedaq_core::device;
pub use scopedaq_core::sink;
pub use scopedaq_core::stats;

pub use scopedaq_core::{
    AcqState, AcquisitionError, AcquisitionLoop, CancelToken, Device, DeviceError, Edge, Event,
    Frame, OsciConfig, PulseAnalyzer, PulseFeatures, Rejection, StatsStore, TriggerDetector,
};
pub use scopedaq_core::{BUILD_DATE, DEFAULT_FRAME_SIZE, DEFAULT_SAMPLE_RATE, VERSION};
