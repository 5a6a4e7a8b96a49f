//! Two-threshold edge trigger
//!
//! A trigger fires only when the signal first leaves its baseline region
//! (crosses the hysteresis boundary away from the threshold) and afterwards
//! crosses the threshold. This rejects signals that were already past the
//! threshold when scanning began and single-sample spikes that never
//! returned to baseline. All comparisons are strict and in raw ADC counts.

use crate::audio::sample::Sample;

/// Edge polarity of the trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Fire when the signal rises above the threshold
    Rising,
    /// Fire when the signal falls below the threshold
    Falling,
}

/// Resolved trigger settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConfig {
    /// 0-based position of the trigger channel in the decoded channel list
    pub channel: usize,
    /// Threshold in ADC counts
    pub threshold: i32,
    /// Hysteresis boundary in ADC counts
    pub hysteresis: i32,
    /// Edge polarity
    pub edge: Edge,
    /// Trigger enabled
    pub active: bool,
}

/// Hysteresis-qualified edge detector
///
/// # Example
/// ```
/// use scopedaq_core::audio::trigger::{Edge, TriggerDetector};
///
/// let trigger = TriggerDetector::new(5000, 625, Edge::Rising);
/// let samples: [i16; 8] = [0, 0, 1200, 6000, 5500, 300, 0, 0];
/// assert_eq!(trigger.scan(&samples), Some(3));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TriggerDetector {
    threshold: i32,
    hysteresis: i32,
    edge: Edge,
}

impl TriggerDetector {
    /// Create a detector
    ///
    /// # Arguments
    /// * `threshold` - Level the signal must strictly cross to fire
    /// * `hysteresis` - Baseline boundary that must be crossed first; below
    ///   the threshold for rising edges, above it for falling edges
    /// * `edge` - Edge polarity
    pub fn new(threshold: i32, hysteresis: i32, edge: Edge) -> Self {
        Self {
            threshold,
            hysteresis,
            edge,
        }
    }

    /// Create a detector from resolved trigger settings
    pub fn from_config(config: &TriggerConfig) -> Self {
        Self::new(config.threshold, config.hysteresis, config.edge)
    }

    /// Threshold in ADC counts
    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    /// Hysteresis boundary in ADC counts
    pub fn hysteresis(&self) -> i32 {
        self.hysteresis
    }

    /// Edge polarity
    pub fn edge(&self) -> Edge {
        self.edge
    }

    fn in_baseline(&self, value: i32) -> bool {
        match self.edge {
            Edge::Rising => value < self.hysteresis,
            Edge::Falling => value > self.hysteresis,
        }
    }

    fn past_threshold(&self, value: i32) -> bool {
        match self.edge {
            Edge::Rising => value > self.threshold,
            Edge::Falling => value < self.threshold,
        }
    }

    /// Find the first valid trigger in `samples`
    ///
    /// Returns the index of the sample that crossed the threshold, or `None`
    /// if no hysteresis crossing is followed by a threshold crossing.
    pub fn scan<S: Sample>(&self, samples: &[S]) -> Option<usize> {
        self.scan_from(samples, 0)
    }

    /// Like [`Self::scan`], but ignores samples before `start`
    ///
    /// The returned index is relative to the whole of `samples`.
    pub fn scan_from<S: Sample>(&self, samples: &[S], start: usize) -> Option<usize> {
        let mut arm = ArmState::Idle;
        self.scan_continued(samples, start, &mut arm)
    }

    /// Scan one buffer of a continuous stream
    ///
    /// `arm` carries the baseline crossing over from the previous buffer, so
    /// an edge whose rise began there still fires here. It is left `Armed`
    /// when this buffer ends in or after a baseline crossing, and `Idle`
    /// after a trigger.
    pub fn scan_continued<S: Sample>(
        &self,
        samples: &[S],
        start: usize,
        arm: &mut ArmState,
    ) -> Option<usize> {
        for (i, sample) in samples.iter().enumerate().skip(start) {
            let value = sample.to_i32();
            match *arm {
                ArmState::Idle => {
                    if self.in_baseline(value) {
                        *arm = ArmState::Armed;
                    }
                }
                ArmState::Armed => {
                    if self.past_threshold(value) {
                        *arm = ArmState::Idle;
                        return Some(i);
                    }
                }
            }
        }
        None
    }
}

/// Trigger arming carried between scanned buffers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArmState {
    /// No baseline sample seen since the last trigger
    #[default]
    Idle,
    /// Baseline seen; the next threshold crossing fires
    Armed,
}
