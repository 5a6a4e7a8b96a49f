//! Acquisition engine
//!
//! This module contains the sound-card oscilloscope pipeline:
//! - Sample types and frames ([`sample`])
//! - Frame sources: sound card, replay and simulation ([`source`], [`soundcard`])
//! - Multi-frame capture ring ([`ring`])
//! - Hysteresis edge trigger ([`trigger`])
//! - Trigger-centred window extraction ([`window`])
//! - Bipolar pulse features ([`pulse`])
//! - Synthetic pulse trains ([`signal`])
//! - The acquisition loop tying them together ([`acquisition`])

pub mod acquisition;
pub mod pulse;
pub mod ring;
pub mod sample;
pub mod signal;
pub mod soundcard;
pub mod source;
pub mod trigger;
pub mod window;
