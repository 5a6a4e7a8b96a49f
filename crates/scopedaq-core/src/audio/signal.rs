//! Synthetic detector-pulse generation
//!
//! Produces deterministic pulse trains shaped like the output of a
//! scintillation detector behind an AC-coupled sound card input: a
//! half-sine main lobe followed by a wider half-sine overshoot of opposite
//! sign. Used by tests, benchmarks and the `--simulate` mode of the binary.

use crate::audio::sample::Sample;
use std::f32::consts::PI;

/// Samples in the main lobe of a generated pulse
pub const MAIN_LOBE_WIDTH: usize = 13;

/// Samples in the overshoot lobe of a generated pulse
pub const OVERSHOOT_WIDTH: usize = 15;

/// Shape of a single pulse
///
/// The main lobe has the sign of `amplitude`; the overshoot has the opposite
/// sign and a peak of `overshoot_ratio * |amplitude|`.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseShape {
    amplitude: f32,
    overshoot_ratio: f32,
    values: Vec<f32>,
}

impl PulseShape {
    /// Bipolar pulse with the given main-lobe amplitude and overshoot ratio
    ///
    /// # Example
    /// ```
    /// use scopedaq_core::audio::signal::PulseShape;
    ///
    /// let pulse = PulseShape::bipolar(10000.0, 0.5);
    /// let samples = pulse.samples::<i16>();
    /// assert_eq!(samples.iter().max(), Some(&10000));
    /// assert_eq!(samples.iter().min(), Some(&-5000));
    /// ```
    pub fn bipolar(amplitude: f32, overshoot_ratio: f32) -> Self {
        let main = (1..=MAIN_LOBE_WIDTH)
            .map(|k| amplitude * (PI * k as f32 / (MAIN_LOBE_WIDTH + 1) as f32).sin());
        let overshoot = (1..=OVERSHOOT_WIDTH).map(|k| {
            -overshoot_ratio * amplitude * (PI * k as f32 / (OVERSHOOT_WIDTH + 1) as f32).sin()
        });
        let values = if overshoot_ratio > 0.0 {
            main.chain(overshoot).collect()
        } else {
            main.collect()
        };
        Self {
            amplitude,
            overshoot_ratio,
            values,
        }
    }

    /// Monopolar pulse: the main lobe only
    pub fn monopolar(amplitude: f32) -> Self {
        Self::bipolar(amplitude, 0.0)
    }

    /// Same shape with the opposite polarity
    pub fn inverted(&self) -> Self {
        Self::bipolar(-self.amplitude, self.overshoot_ratio)
    }

    /// Main-lobe amplitude
    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    /// Overshoot peak relative to the main lobe
    pub fn overshoot_ratio(&self) -> f32 {
        self.overshoot_ratio
    }

    /// Pulse length in samples
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for an empty shape (never produced by the constructors)
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `offset` samples from the pulse start; zero past its end
    pub fn value_at(&self, offset: usize) -> f32 {
        self.values.get(offset).copied().unwrap_or(0.0)
    }

    /// Pulse values as floating point
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Pulse values rounded into sample type `S`
    pub fn samples<S: Sample>(&self) -> Vec<S> {
        self.values.iter().map(|&v| S::from_f32(v)).collect()
    }
}

/// Linear congruential noise source, uniform in `[-1, 1)`
#[derive(Debug, Clone)]
struct Lcg {
    state: u32,
}

impl Lcg {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> f32 {
        self.state = self.state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (self.state >> 8) as f32 / (1u32 << 23) as f32 - 1.0
    }
}

/// Periodic pulse train with optional baseline noise
///
/// Pulses start every `interval` samples, the first one after `offset`
/// samples. With several shapes the train cycles through them in order.
#[derive(Debug, Clone)]
pub struct PulseGenerator {
    shapes: Vec<PulseShape>,
    interval: usize,
    offset: usize,
    noise_amplitude: f32,
    seed: u32,
    noise: Lcg,
    position: u64,
}

impl PulseGenerator {
    /// Create a generator repeating one shape
    ///
    /// # Arguments
    /// * `shape` - Pulse shape
    /// * `interval` - Samples between pulse starts
    ///
    /// # Panics
    /// Panics if `interval` is shorter than the pulse.
    pub fn new(shape: PulseShape, interval: usize) -> Self {
        Self::with_shapes(vec![shape], interval)
    }

    /// Create a generator cycling through `shapes`
    ///
    /// # Panics
    /// Panics if `shapes` is empty or `interval` is shorter than a pulse.
    pub fn with_shapes(shapes: Vec<PulseShape>, interval: usize) -> Self {
        assert!(!shapes.is_empty(), "at least one pulse shape required");
        assert!(
            shapes.iter().all(|s| s.len() <= interval),
            "pulse interval shorter than the pulse"
        );
        Self {
            shapes,
            interval,
            offset: 0,
            noise_amplitude: 0.0,
            seed: 1,
            noise: Lcg::new(1),
            position: 0,
        }
    }

    /// Delay the first pulse by `offset` samples
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Add uniform noise of peak `amplitude` from a seeded LCG
    pub fn with_noise(mut self, amplitude: f32, seed: u32) -> Self {
        self.noise_amplitude = amplitude;
        self.seed = seed;
        self.noise = Lcg::new(seed);
        self
    }

    /// Samples generated so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Samples between pulse starts
    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Stream position of the start of pulse number `n` (0-based)
    pub fn pulse_start(&self, n: u64) -> u64 {
        self.offset as u64 + n * self.interval as u64
    }

    /// Next value of the train
    pub fn next_value(&mut self) -> f32 {
        let position = self.position;
        self.position += 1;

        let mut value = 0.0;
        if let Some(since) = position.checked_sub(self.offset as u64) {
            let pulse = since / self.interval as u64;
            let shape = &self.shapes[(pulse % self.shapes.len() as u64) as usize];
            value = shape.value_at((since % self.interval as u64) as usize);
        }
        if self.noise_amplitude > 0.0 {
            value += self.noise_amplitude * self.noise.next();
        }
        value
    }

    /// Fill `buffer` with the next samples
    pub fn fill<S: Sample>(&mut self, buffer: &mut [S]) {
        for sample in buffer.iter_mut() {
            *sample = S::from_f32(self.next_value());
        }
    }

    /// Restart the train from position zero
    pub fn reset(&mut self) {
        self.position = 0;
        self.noise = Lcg::new(self.seed);
    }
}
