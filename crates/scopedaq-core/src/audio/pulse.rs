//! Pulse-shape features for bipolar detector pulses
//!
//! Detector pulses seen through a sound card's AC-coupled input are
//! bipolar: a main lobe followed by an overshoot of opposite sign. The
//! analyzer measures both lobes of the pulse that caused a trigger and
//! rejects shapes whose overshoot is too small, which filters out noise and
//! monopolar artifacts.
//!
//! The window is first oriented so the main lobe is negative-going.
//! Missing zero crossings for the width estimates yield the
//! [`FWHM_UNDETERMINED`] sentinel instead of failing the analysis.

use crate::audio::sample::Sample;
use thiserror::Error;

/// Sentinel for a full-width-half-max that could not be determined
pub const FWHM_UNDETERMINED: i32 = -1;

/// Features of one accepted bipolar pulse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseFeatures {
    /// Second peak minus first peak (oriented), in ADC counts
    pub pp_height: f32,
    /// |second peak / first peak|
    pub p_ratio: f32,
    /// Samples between the two peaks
    pub p_dist: usize,
    /// FWHM of the main lobe in samples, or [`FWHM_UNDETERMINED`]
    pub fwhm1: i32,
    /// FWHM of the overshoot lobe in samples, or [`FWHM_UNDETERMINED`]
    pub fwhm2: i32,
}

impl PulseFeatures {
    /// Main-lobe FWHM, if determined
    pub fn main_fwhm(&self) -> Option<usize> {
        usize::try_from(self.fwhm1).ok()
    }

    /// Overshoot-lobe FWHM, if determined
    pub fn overshoot_fwhm(&self) -> Option<usize> {
        usize::try_from(self.fwhm2).ok()
    }
}

/// Why a pulse was not accepted
///
/// Rejection is a normal filtering outcome, not an acquisition error.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    #[error("trigger offset {0} lies outside the window")]
    TriggerOutsideWindow(usize),

    #[error("no zero crossing after the trigger point")]
    NoZeroCrossing,

    #[error("main lobe does not go below baseline")]
    NoMainLobe,

    #[error("no samples left for the overshoot lobe")]
    NoOvershootLobe,

    #[error("overshoot ratio {ratio:.3} below cutoff {cutoff:.3}")]
    Overshoot { ratio: f32, cutoff: f32 },
}

/// Bipolar pulse analyzer
#[derive(Debug, Clone, Copy)]
pub struct PulseAnalyzer {
    overshoot_fraction: f32,
    max_peak_separation: usize,
}

impl PulseAnalyzer {
    /// Create an analyzer
    ///
    /// # Arguments
    /// * `overshoot_fraction` - Minimum |second peak / first peak| to accept
    /// * `max_peak_separation` - Samples after the zero crossing searched for
    ///   the second peak
    pub fn new(overshoot_fraction: f32, max_peak_separation: usize) -> Self {
        Self {
            overshoot_fraction,
            max_peak_separation: max_peak_separation.max(1),
        }
    }

    /// Overshoot cutoff
    pub fn overshoot_fraction(&self) -> f32 {
        self.overshoot_fraction
    }

    /// Second-peak lookahead in samples
    pub fn max_peak_separation(&self) -> usize {
        self.max_peak_separation
    }

    /// Analyze the pulse around `trigger_offset` in `window`
    ///
    /// # Arguments
    /// * `window` - Samples of the trigger channel
    /// * `trigger_offset` - Index of the trigger sample within `window`
    /// * `falling` - Trigger mode; rising-mode windows are inverted so the
    ///   main lobe is negative
    pub fn analyze<S: Sample>(
        &self,
        window: &[S],
        trigger_offset: usize,
        falling: bool,
    ) -> Result<PulseFeatures, Rejection> {
        let sign = if falling { 1.0 } else { -1.0 };
        let signal: Vec<f32> = window.iter().map(|s| sign * s.to_f32()).collect();
        self.analyze_oriented(&signal, trigger_offset)
    }

    /// Analyze a window already oriented with a negative main lobe
    pub fn analyze_oriented(
        &self,
        signal: &[f32],
        trigger_offset: usize,
    ) -> Result<PulseFeatures, Rejection> {
        let it = trigger_offset;
        if it >= signal.len() {
            return Err(Rejection::TriggerOutsideWindow(it));
        }

        let i0 = sign_changes(&signal[it..], |v| v > 0.0)
            .next()
            .map(|i| i + it)
            .ok_or(Rejection::NoZeroCrossing)?;

        let (i1p, p_min) = extremum(&signal[it..=i0], |a, b| a < b);
        let i1p = i1p + it;
        if p_min >= 0.0 {
            return Err(Rejection::NoMainLobe);
        }

        let lobe_end = (i0 + self.max_peak_separation).min(signal.len());
        if i0 + 1 >= lobe_end {
            return Err(Rejection::NoOvershootLobe);
        }
        let (i2p, p_max) = extremum(&signal[i0 + 1..lobe_end], |a, b| a > b);
        let i2p = i2p + i0 + 1;

        let pp_height = p_max - p_min;
        let p_ratio = (p_max / p_min).abs();
        if p_ratio < self.overshoot_fraction {
            return Err(Rejection::Overshoot {
                ratio: p_ratio,
                cutoff: self.overshoot_fraction,
            });
        }

        // main lobe: last two crossings of the half-height level before the zero crossing
        let half_min = p_min / 2.0;
        let crossings: Vec<usize> = sign_changes(&signal[..=i0], |v| v - half_min > 0.0).collect();
        let fwhm1 = match crossings.as_slice() {
            [.., a, b] => (b - a) as i32,
            _ => FWHM_UNDETERMINED,
        };

        // overshoot lobe: first two crossings of its half-height level
        let half_max = p_max / 2.0;
        let mut crossings = sign_changes(&signal[i0.saturating_sub(1)..], |v| v - half_max < 0.0);
        let fwhm2 = match (crossings.next(), crossings.next()) {
            (Some(a), Some(b)) => (b - a) as i32,
            _ => FWHM_UNDETERMINED,
        };

        Ok(PulseFeatures {
            pp_height,
            p_ratio,
            p_dist: i2p - i1p,
            fwhm1,
            fwhm2,
        })
    }
}

/// Indices `i` where `predicate(signal[i]) != predicate(signal[i + 1])`
fn sign_changes<'a, P>(signal: &'a [f32], predicate: P) -> impl Iterator<Item = usize> + 'a
where
    P: Fn(f32) -> bool + 'a,
{
    signal
        .windows(2)
        .enumerate()
        .filter(move |(_, pair)| predicate(pair[0]) != predicate(pair[1]))
        .map(|(i, _)| i)
}

/// First index and value of the extremum selected by `better`
fn extremum(signal: &[f32], better: impl Fn(f32, f32) -> bool) -> (usize, f32) {
    signal
        .iter()
        .copied()
        .enumerate()
        .fold((0, signal[0]), |best, (i, v)| {
            if better(v, best.1) {
                (i, v)
            } else {
                best
            }
        })
}
