//! Run statistics for an acquisition session
//!
//! Counts accepted events, rejected pulses by reason, tolerated read errors
//! and input overruns, and keeps a bounded history of event-rate
//! measurements. This is the visible error/rate counter of a running
//! session: sustained failures show up here instead of ending the run.

use crate::audio::pulse::{PulseFeatures, Rejection};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Maximum number of rate measurements kept (1 hour at 1 sample/sec)
const MAX_HISTORY_SIZE: usize = 3600;

/// Maximum number of error events kept
const MAX_ERROR_EVENTS: usize = 1000;

/// A single measurement point
#[derive(Debug, Clone)]
pub struct Measurement {
    /// Timestamp of the measurement
    pub timestamp: DateTime<Utc>,
    /// Value of the measurement
    pub value: f64,
}

/// A tolerated read error
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// When the error occurred
    pub timestamp: DateTime<Utc>,
    /// Error description
    pub message: String,
}

/// Rejected pulses by reason
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RejectionCounts {
    pub trigger_outside_window: u64,
    pub no_zero_crossing: u64,
    pub no_main_lobe: u64,
    pub no_overshoot_lobe: u64,
    pub overshoot: u64,
}

impl RejectionCounts {
    /// Sum over all reasons
    pub fn total(&self) -> u64 {
        self.trigger_outside_window
            + self.no_zero_crossing
            + self.no_main_lobe
            + self.no_overshoot_lobe
            + self.overshoot
    }
}

/// Running statistics of a session
#[derive(Debug, Clone)]
pub struct RunningStats {
    /// Session start
    pub started: DateTime<Utc>,
    /// Events delivered to the caller
    pub events: u64,
    /// Frames read from the source
    pub frames_read: u64,
    /// Pulses dropped by the shape filter
    pub rejections: RejectionCounts,
    /// Transient read errors tolerated
    pub transient_errors: u64,
    /// Input overruns reported by the source
    pub overruns: u64,
    /// Most recent event rate (Hz)
    pub current_rate: f64,
    /// Mean peak-to-peak height of analyzed pulses
    pub avg_pulse_height: f64,
    /// Pulses contributing to `avg_pulse_height`
    pub analyzed_pulses: u64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            started: Utc::now(),
            events: 0,
            frames_read: 0,
            rejections: RejectionCounts::default(),
            transient_errors: 0,
            overruns: 0,
            current_rate: 0.0,
            avg_pulse_height: 0.0,
            analyzed_pulses: 0,
        }
    }
}

/// Statistics store for one acquisition session
#[derive(Debug)]
pub struct StatsStore {
    /// Event-rate measurements (Hz)
    rate_history: VecDeque<Measurement>,
    /// Most recent tolerated errors
    error_events: VecDeque<ErrorEvent>,
    /// Maximum history size
    max_size: usize,
    stats: RunningStats,
}

impl StatsStore {
    /// Create an empty store; the session clock starts now
    pub fn new() -> Self {
        Self {
            rate_history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            error_events: VecDeque::new(),
            max_size: MAX_HISTORY_SIZE,
            stats: RunningStats::default(),
        }
    }

    /// Record a delivered event and, if analyzed, its pulse features
    pub fn record_event(&mut self, features: Option<&PulseFeatures>) {
        self.stats.events += 1;
        if let Some(features) = features {
            let n = self.stats.analyzed_pulses as f64;
            self.stats.avg_pulse_height =
                (self.stats.avg_pulse_height * n + features.pp_height as f64) / (n + 1.0);
            self.stats.analyzed_pulses += 1;
        }
    }

    /// Record a pulse dropped by the shape filter
    pub fn record_rejection(&mut self, rejection: &Rejection) {
        let counts = &mut self.stats.rejections;
        match rejection {
            Rejection::TriggerOutsideWindow(_) => counts.trigger_outside_window += 1,
            Rejection::NoZeroCrossing => counts.no_zero_crossing += 1,
            Rejection::NoMainLobe => counts.no_main_lobe += 1,
            Rejection::NoOvershootLobe => counts.no_overshoot_lobe += 1,
            Rejection::Overshoot { .. } => counts.overshoot += 1,
        }
    }

    /// Record one frame read from the source
    pub fn record_frame(&mut self) {
        self.stats.frames_read += 1;
    }

    /// Record a tolerated read error
    ///
    /// # Arguments
    /// * `message` - Error description kept in the error log
    pub fn record_error(&mut self, message: impl Into<String>) {
        if self.error_events.len() >= MAX_ERROR_EVENTS {
            self.error_events.pop_front();
        }
        self.error_events.push_back(ErrorEvent {
            timestamp: Utc::now(),
            message: message.into(),
        });
        self.stats.transient_errors += 1;
    }

    /// Set the cumulative overrun count reported by the source
    pub fn set_overruns(&mut self, overruns: u64) {
        self.stats.overruns = overruns;
    }

    /// Record an event-rate measurement
    ///
    /// # Arguments
    /// * `rate_hz` - Events per second over the last interval
    pub fn record_rate(&mut self, rate_hz: f64) {
        if self.rate_history.len() >= self.max_size {
            self.rate_history.pop_front();
        }
        self.rate_history.push_back(Measurement {
            timestamp: Utc::now(),
            value: rate_hz,
        });
        self.stats.current_rate = rate_hz;
    }

    /// Fraction of read attempts that failed
    pub fn error_rate(&self) -> f64 {
        let attempts = self.stats.frames_read + self.stats.transient_errors;
        if attempts == 0 {
            0.0
        } else {
            self.stats.transient_errors as f64 / attempts as f64
        }
    }

    /// Mean event rate since the session started (Hz)
    pub fn average_rate(&self) -> f64 {
        let elapsed = (Utc::now() - self.stats.started).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            0.0
        } else {
            self.stats.events as f64 / elapsed
        }
    }

    /// Get rate history
    pub fn rate_history(&self) -> &VecDeque<Measurement> {
        &self.rate_history
    }

    /// Get recent error events
    pub fn error_events(&self) -> &VecDeque<ErrorEvent> {
        &self.error_events
    }

    /// Get running statistics
    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Get rate values for plotting (last N points)
    ///
    /// # Returns
    /// Vector of (time_offset_seconds, rate_hz) pairs
    pub fn rate_plot_data(&self, count: usize) -> Vec<(f64, f64)> {
        let now = Utc::now();
        self.rate_history
            .iter()
            .rev()
            .take(count)
            .map(|m| {
                let time_offset = (now - m.timestamp).num_milliseconds() as f64 / 1000.0;
                (-time_offset, m.value)
            })
            .collect()
    }

    /// Reset counters without clearing history
    ///
    /// The session clock restarts; rate history and the error log are kept.
    pub fn reset_counters(&mut self) {
        self.stats = RunningStats::default();
    }

    /// Clear all history and reset statistics
    pub fn clear(&mut self) {
        self.rate_history.clear();
        self.error_events.clear();
        self.stats = RunningStats::default();
    }
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new()
    }
}
