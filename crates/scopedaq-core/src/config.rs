//! Oscilloscope configuration
//!
//! One explicit record holds every acquisition option. The JSON keys use
//! the PhyPiDAQ option names (`trgActive`, `trgThreshold`, ...) so existing
//! configuration files load unchanged. Everything is validated once, at construction of the
//! acquisition loop, by [`OsciConfig::validate_for`].

use crate::audio::sample::Sample;
use crate::audio::trigger::{Edge, TriggerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors found while validating or persisting a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("sampling rate {0} Hz is outside 1000..=384000")]
    SamplingRate(u32),

    #[error("number_of_samples must be > 0")]
    FrameSize,

    #[error("channel list is empty")]
    NoChannels,

    #[error("channel {0} is invalid (channels are 1-based)")]
    ChannelIndex(u16),

    #[error("channel {0} is listed twice")]
    DuplicateChannel(u16),

    #[error("trigger channel {trg_chan} is not in 1..={channels}")]
    TriggerChannel { trg_chan: u16, channels: usize },

    #[error("{name} {value} exceeds the sample full scale {full_scale}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        full_scale: i64,
    },

    #[error("hysteresis {hysteresis} must be {side} the threshold {threshold} for {edge:?} edges")]
    HysteresisSide {
        hysteresis: i32,
        threshold: i32,
        edge: Edge,
        side: &'static str,
    },

    #[error("ring needs at least 3 slots, got {0}")]
    RingSlots(usize),

    #[error("window_length must be > 0")]
    WindowLength,

    #[error("pre_trigger_fraction {0} is outside 0.0..1.0")]
    PreTriggerFraction(f64),

    #[error(
        "window of {window_length} samples ({pre} pre, {post} post) does not fit \
         {slots} slots of {frame_size} samples"
    )]
    WindowTooLong {
        window_length: usize,
        pre: usize,
        post: usize,
        slots: usize,
        frame_size: usize,
    },

    #[error("overshoot_fraction {0} must be finite and >= 0")]
    OvershootFraction(f64),

    #[error("max_peak_separation must be > 0")]
    PeakSeparation,

    #[error("max_consecutive_errors must be > 0")]
    MaxConsecutiveErrors,

    #[error("range {0} must be finite and > 0")]
    Range(f64),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_sampling_rate() -> u32 {
    crate::DEFAULT_SAMPLE_RATE
}

fn default_number_of_samples() -> usize {
    crate::DEFAULT_FRAME_SIZE
}

fn default_channels() -> Vec<u16> {
    vec![1]
}

fn default_trg_chan() -> u16 {
    1
}

fn default_trg_threshold() -> f64 {
    100.0
}

fn default_overshoot_fraction() -> f64 {
    0.25
}

fn default_range() -> f64 {
    (1u32 << 15) as f64
}

fn default_window_length() -> usize {
    100
}

fn default_pre_trigger_fraction() -> f64 {
    0.5
}

fn default_ring_slots() -> usize {
    3
}

fn default_max_consecutive_errors() -> u32 {
    100
}

/// Sound-card oscilloscope configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsciConfig {
    /// Input device name (None = system default input)
    #[serde(default)]
    pub device: Option<String>,
    /// Sample rate in Hz, fixed when the stream opens
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u32,
    /// Frame size: samples per channel per read
    #[serde(default = "default_number_of_samples")]
    pub number_of_samples: usize,
    /// 1-based stream channels to decode, in output order
    #[serde(default = "default_channels")]
    pub channels: Vec<u16>,
    /// Trigger enabled (false = free-running)
    #[serde(rename = "trgActive", default)]
    pub trg_active: bool,
    /// 1-based position of the trigger channel in `channels`
    #[serde(rename = "trgChan", default = "default_trg_chan")]
    pub trg_chan: u16,
    /// Trigger threshold in ADC counts
    #[serde(rename = "trgThreshold", default = "default_trg_threshold")]
    pub trg_threshold: f64,
    /// Hysteresis boundary in ADC counts (None = floor(threshold / 8))
    #[serde(rename = "trgHysteresis", default)]
    pub trg_hysteresis: Option<f64>,
    /// Trigger on falling instead of rising edges
    #[serde(rename = "trgFalling", default)]
    pub trg_falling: bool,
    /// Run pulse-shape analysis and drop non-bipolar pulses
    #[serde(rename = "pulseFilter", default)]
    pub pulse_filter: bool,
    /// Minimum |second peak / first peak| ratio of an accepted pulse
    #[serde(default = "default_overshoot_fraction")]
    pub overshoot_fraction: f64,
    /// Maximum samples between zero crossing and second peak
    /// (None = 10 * max(1, sampling_rate / 48000))
    #[serde(default)]
    pub max_peak_separation: Option<usize>,
    /// Full-scale amplitude for display normalisation
    #[serde(default = "default_range")]
    pub range: f64,
    /// Samples per extracted window
    #[serde(default = "default_window_length")]
    pub window_length: usize,
    /// Fraction of the window placed before the trigger sample
    #[serde(default = "default_pre_trigger_fraction")]
    pub pre_trigger_fraction: f64,
    /// Frame slots in the capture ring
    #[serde(default = "default_ring_slots")]
    pub ring_slots: usize,
    /// Consecutive transient read errors tolerated before giving up
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

impl Default for OsciConfig {
    fn default() -> Self {
        Self {
            device: None,
            sampling_rate: default_sampling_rate(),
            number_of_samples: default_number_of_samples(),
            channels: default_channels(),
            trg_active: false,
            trg_chan: default_trg_chan(),
            trg_threshold: default_trg_threshold(),
            trg_hysteresis: None,
            trg_falling: false,
            pulse_filter: false,
            overshoot_fraction: default_overshoot_fraction(),
            max_peak_separation: None,
            range: default_range(),
            window_length: default_window_length(),
            pre_trigger_fraction: default_pre_trigger_fraction(),
            ring_slots: default_ring_slots(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

impl OsciConfig {
    /// Number of channels in the interleaved stream (highest selected channel)
    pub fn stream_channels(&self) -> usize {
        self.channels.iter().copied().max().unwrap_or(1) as usize
    }

    /// Threshold rounded to ADC counts
    pub fn threshold(&self) -> i32 {
        self.trg_threshold.round() as i32
    }

    /// Effective hysteresis boundary in ADC counts
    pub fn hysteresis(&self) -> i32 {
        match self.trg_hysteresis {
            Some(h) => h.round() as i32,
            None => self.threshold().div_euclid(8),
        }
    }

    /// Trigger edge
    pub fn edge(&self) -> Edge {
        if self.trg_falling {
            Edge::Falling
        } else {
            Edge::Rising
        }
    }

    /// Resolved trigger settings
    pub fn trigger(&self) -> TriggerConfig {
        TriggerConfig {
            channel: self.trg_chan.saturating_sub(1) as usize,
            threshold: self.threshold(),
            hysteresis: self.hysteresis(),
            edge: self.edge(),
            active: self.trg_active,
        }
    }

    /// Samples of the window before the trigger sample
    pub fn pre_trigger_samples(&self) -> usize {
        crate::audio::window::pre_samples(self.window_length, self.pre_trigger_fraction)
    }

    /// Lookahead for the second pulse peak
    pub fn max_peak_separation(&self) -> usize {
        self.max_peak_separation
            .unwrap_or_else(|| 10 * (self.sampling_rate / 48000).max(1) as usize)
    }

    /// Validate against the full scale of the 16-bit sound card format
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_for::<i16>()
    }

    /// Validate every option once, against the full scale of sample type `S`
    pub fn validate_for<S: Sample>(&self) -> Result<(), ConfigError> {
        if !(1000..=384000).contains(&self.sampling_rate) {
            return Err(ConfigError::SamplingRate(self.sampling_rate));
        }
        if self.number_of_samples == 0 {
            return Err(ConfigError::FrameSize);
        }
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        for (i, &channel) in self.channels.iter().enumerate() {
            if channel == 0 {
                return Err(ConfigError::ChannelIndex(channel));
            }
            if self.channels[..i].contains(&channel) {
                return Err(ConfigError::DuplicateChannel(channel));
            }
        }
        if self.trg_chan == 0 || self.trg_chan as usize > self.channels.len() {
            return Err(ConfigError::TriggerChannel {
                trg_chan: self.trg_chan,
                channels: self.channels.len(),
            });
        }
        if !self.range.is_finite() || self.range <= 0.0 {
            return Err(ConfigError::Range(self.range));
        }

        let full_scale = S::FULL_SCALE;
        for (name, value) in [
            ("trgThreshold", Some(self.trg_threshold)),
            ("trgHysteresis", self.trg_hysteresis),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || value.abs() > full_scale as f64 {
                    return Err(ConfigError::OutOfRange {
                        name,
                        value,
                        full_scale,
                    });
                }
            }
        }

        if self.trg_active {
            let (threshold, hysteresis) = (self.threshold(), self.hysteresis());
            let edge = self.edge();
            let misplaced = match edge {
                Edge::Rising => hysteresis >= threshold,
                Edge::Falling => hysteresis <= threshold,
            };
            if misplaced {
                return Err(ConfigError::HysteresisSide {
                    hysteresis,
                    threshold,
                    edge,
                    side: match edge {
                        Edge::Rising => "below",
                        Edge::Falling => "above",
                    },
                });
            }
        }

        if self.ring_slots < 3 {
            return Err(ConfigError::RingSlots(self.ring_slots));
        }
        if self.window_length == 0 {
            return Err(ConfigError::WindowLength);
        }
        if !(0.0..1.0).contains(&self.pre_trigger_fraction) {
            return Err(ConfigError::PreTriggerFraction(self.pre_trigger_fraction));
        }
        // windows only exist in triggered mode
        let pre = self.pre_trigger_samples();
        let post = self.window_length - pre;
        if self.trg_active
            && (pre > (self.ring_slots - 2) * self.number_of_samples
                || post > self.number_of_samples)
        {
            return Err(ConfigError::WindowTooLong {
                window_length: self.window_length,
                pre,
                post,
                slots: self.ring_slots,
                frame_size: self.number_of_samples,
            });
        }

        if !self.overshoot_fraction.is_finite() || self.overshoot_fraction < 0.0 {
            return Err(ConfigError::OvershootFraction(self.overshoot_fraction));
        }
        if self.max_peak_separation == Some(0) {
            return Err(ConfigError::PeakSeparation);
        }
        if self.max_consecutive_errors == 0 {
            return Err(ConfigError::MaxConsecutiveErrors);
        }
        Ok(())
    }

    /// Default config file path: `<config_dir>/scopedaq/config.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scopedaq")
            .join("config.json")
    }

    /// Load config from disk, falling back to defaults on any error
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triggered() -> OsciConfig {
        OsciConfig {
            trg_active: true,
            trg_threshold: 5000.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = OsciConfig::default();
        assert_eq!(config.sampling_rate, 44100);
        assert_eq!(config.number_of_samples, 1024);
        assert_eq!(config.channels, vec![1]);
        assert!(!config.trg_active);
        assert_eq!(config.threshold(), 100);
        assert_eq!(config.window_length, 100);
        assert_eq!(config.ring_slots, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_hysteresis_default_is_floor_eighth() {
        let mut config = triggered();
        assert_eq!(config.hysteresis(), 625);
        config.trg_threshold = -5001.0;
        assert_eq!(config.hysteresis(), -626);
        config.trg_hysteresis = Some(-100.0);
        assert_eq!(config.hysteresis(), -100);
    }

    #[test]
    fn test_peak_separation_default() {
        let mut config = OsciConfig::default();
        assert_eq!(config.max_peak_separation(), 10);
        config.sampling_rate = 192000;
        assert_eq!(config.max_peak_separation(), 40);
        config.max_peak_separation = Some(7);
        assert_eq!(config.max_peak_separation(), 7);
    }

    #[test]
    fn test_option_keys_parse() {
        let json = r#"{
            "sampling_rate": 48000,
            "number_of_samples": 2048,
            "channels": [1, 2],
            "trgActive": true,
            "trgChan": 2,
            "trgThreshold": 250,
            "trgFalling": false,
            "overshoot_fraction": 0.3,
            "range": 4096
        }"#;
        let config: OsciConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.sampling_rate, 48000);
        assert_eq!(config.channels, vec![1, 2]);
        assert!(config.trg_active);
        assert_eq!(config.trigger().channel, 1);
        assert_eq!(config.trigger().threshold, 250);
        assert_eq!(config.trigger().hysteresis, 31);
        assert_eq!(config.stream_channels(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: OsciConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, OsciConfig::default());
    }

    #[test]
    fn test_rejects_bad_channels() {
        let config = OsciConfig {
            channels: vec![],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoChannels)));

        let config = OsciConfig {
            channels: vec![0],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ChannelIndex(0))));

        let config = OsciConfig {
            channels: vec![1, 1],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateChannel(1))
        ));

        let config = OsciConfig {
            trg_chan: 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TriggerChannel { .. })
        ));
    }

    #[test]
    fn test_rejects_hysteresis_on_wrong_side() {
        let mut config = triggered();
        config.trg_hysteresis = Some(6000.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HysteresisSide { .. })
        ));

        // falling edge with a positive threshold: floor(5000/8) = 625 is below it
        config.trg_hysteresis = None;
        config.trg_falling = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HysteresisSide { .. })
        ));

        config.trg_threshold = -5000.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_threshold_beyond_full_scale() {
        let mut config = triggered();
        config.trg_threshold = 40000.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(config.validate_for::<i32>().is_ok());
    }

    #[test]
    fn test_rejects_window_that_does_not_fit() {
        let config = OsciConfig {
            number_of_samples: 64,
            window_length: 200,
            ..triggered()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WindowTooLong { .. })
        ));

        let config = OsciConfig {
            number_of_samples: 64,
            window_length: 100,
            pre_trigger_fraction: 0.37,
            ..triggered()
        };
        assert!(config.validate().is_ok());

        // free-running mode never extracts windows
        let config = OsciConfig {
            number_of_samples: 16,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_too_few_slots() {
        let config = OsciConfig {
            ring_slots: 2,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::RingSlots(2))));
    }

    #[test]
    fn test_rejects_zero_error_limit() {
        let config = OsciConfig {
            max_consecutive_errors: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MaxConsecutiveErrors)
        ));

        let config = OsciConfig {
            max_consecutive_errors: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = OsciConfig {
            device: Some("USB Audio".to_string()),
            trg_active: true,
            trg_threshold: 5000.0,
            channels: vec![1, 2],
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = OsciConfig::load(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = OsciConfig::load(&dir.path().join("missing.json"));
        assert_eq!(loaded, OsciConfig::default());
    }
}
