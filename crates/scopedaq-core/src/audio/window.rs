//! Trigger-centred window extraction
//!
//! A window is a fixed number of samples around the trigger sample, split
//! into `pre` samples before it and the rest from the trigger sample on.
//! Windows are copied out of the ring, so consumers on other threads never
//! see a slot that is about to be overwritten.

use crate::audio::ring::RingCapture;
use crate::audio::sample::{Frame, Sample};

/// Per-channel samples of one extracted window
pub type Window<S> = Frame<S>;

/// Number of pre-trigger samples: `floor(fraction * length)`
///
/// A tiny epsilon keeps fractions like 0.37 from rounding down a sample due
/// to binary representation.
pub fn pre_samples(length: usize, fraction: f64) -> usize {
    let pre = (fraction * length as f64 + 1e-9).floor();
    (pre.max(0.0) as usize).min(length)
}

/// Fixed-length window extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowExtractor {
    length: usize,
    pre: usize,
}

impl WindowExtractor {
    /// Create an extractor
    ///
    /// # Arguments
    /// * `length` - Samples per window
    /// * `pre_trigger_fraction` - Share of the window before the trigger sample
    pub fn new(length: usize, pre_trigger_fraction: f64) -> Self {
        Self {
            length,
            pre: pre_samples(length, pre_trigger_fraction),
        }
    }

    /// Samples per window
    pub fn length(&self) -> usize {
        self.length
    }

    /// Samples before the trigger; also the trigger's offset in the window
    pub fn pre_samples(&self) -> usize {
        self.pre
    }

    /// Samples from the trigger sample to the end of the window
    pub fn post_samples(&self) -> usize {
        self.length - self.pre
    }

    /// True if every window around a trigger in one slot stays within the
    /// `slots - 2` slots before it and the one slot after it
    pub fn fits(&self, frame_size: usize, slots: usize) -> bool {
        slots >= 3 && self.pre <= (slots - 2) * frame_size && self.post_samples() <= frame_size
    }

    /// Copy the window around `trigger_index` (a global ring index) for all
    /// channels
    pub fn extract<S: Sample>(&self, ring: &RingCapture<S>, trigger_index: usize) -> Window<S> {
        let start = trigger_index as isize - self.pre as isize;
        Frame::from_channels(
            (0..ring.channel_count())
                .map(|channel| ring.copy_wrapped(channel, start, self.length))
                .collect(),
        )
    }
}

/// Extract one window: the free-function form of [`WindowExtractor::extract`]
pub fn extract<S: Sample>(
    ring: &RingCapture<S>,
    trigger_index: usize,
    length: usize,
    pre_trigger_fraction: f64,
) -> Window<S> {
    WindowExtractor::new(length, pre_trigger_fraction).extract(ring, trigger_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_ring(frame_size: usize, slots: usize) -> RingCapture<i16> {
        let mut ring = RingCapture::new(2, frame_size, slots);
        for slot in 0..slots {
            let base = (slot * frame_size) as i16;
            let ch0: Vec<i16> = (0..frame_size as i16).map(|i| base + i).collect();
            let ch1: Vec<i16> = ch0.iter().map(|v| -v).collect();
            ring.write(&Frame::from_channels(vec![ch0, ch1]));
        }
        ring
    }

    #[test]
    fn test_pre_samples() {
        assert_eq!(pre_samples(100, 0.5), 50);
        assert_eq!(pre_samples(100, 0.37), 37);
        assert_eq!(pre_samples(100, 0.0), 0);
        assert_eq!(pre_samples(7, 0.5), 3);
    }

    #[test]
    fn test_extract_middle() {
        let ring = ramp_ring(16, 3);
        let window = WindowExtractor::new(10, 0.3).extract(&ring, 20);
        assert_eq!(window.len(), 10);
        assert_eq!(window.channel(0), &[17, 18, 19, 20, 21, 22, 23, 24, 25, 26]);
        assert_eq!(window.channel(1)[3], -20);
    }

    #[test]
    fn test_extract_wraps_before_start() {
        let ring = ramp_ring(16, 3);
        let window = extract(&ring, 1, 6, 0.5);
        assert_eq!(window.channel(0), &[46, 47, 0, 1, 2, 3]);
    }

    #[test]
    fn test_extract_wraps_after_end() {
        let ring = ramp_ring(16, 3);
        let window = extract(&ring, 46, 6, 0.5);
        assert_eq!(window.channel(0), &[43, 44, 45, 46, 47, 0]);
    }

    #[test]
    fn test_length_invariant_for_every_trigger_position() {
        let ring = ramp_ring(8, 3);
        let extractor = WindowExtractor::new(9, 0.37);
        for trigger in 0..ring.len() {
            let window = extractor.extract(&ring, trigger);
            assert_eq!(window.len(), 9, "trigger at {}", trigger);
            assert_eq!(
                window.channel(0)[extractor.pre_samples()],
                trigger as i16,
                "trigger sample must sit at the pre-trigger offset"
            );
        }
    }

    #[test]
    fn test_fits() {
        let extractor = WindowExtractor::new(100, 0.37);
        assert!(extractor.fits(64, 3));
        assert!(!extractor.fits(32, 3));
        assert!(!extractor.fits(64, 2));
    }
}
