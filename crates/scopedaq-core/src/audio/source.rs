//! Frame sources feeding the acquisition loop
//!
//! A [`FrameSource`] delivers fixed-size frames of already decoded channel
//! data. Reads block until a full frame is available; the read cadence is
//! the only timing source of the acquisition loop.

use crate::audio::sample::{Frame, Sample};
use crate::audio::signal::PulseGenerator;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors reported by frame sources and devices
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Unsupported stream configuration: {0}")]
    UnsupportedConfig(String),

    #[error("Failed to open stream: {0}")]
    StreamOpen(String),

    #[error("Stream failed: {0}")]
    StreamFailed(String),

    #[error("Device is closed")]
    Closed,

    #[error("Transient read error: {0}")]
    Transient(String),

    #[error("Audio host error: {0}")]
    Host(String),
}

impl DeviceError {
    /// True for errors after which reading may simply continue
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Transient(_))
    }
}

/// Cooperative cancellation flag shared between the loop and its owner
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an untriggered token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// True once [`Self::cancel`] was called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Outcome of a successful read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The frame buffer holds a new frame
    Frame,
    /// The source is closed, exhausted or cancelled; no frame was written
    Closed,
}

/// A blocking source of fixed-size frames
pub trait FrameSource<S: Sample> {
    /// Number of decoded channels per frame
    fn channel_count(&self) -> usize;

    /// Samples per channel per frame
    fn frame_size(&self) -> usize;

    /// Sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Read the next frame into `frame`, blocking until it is complete
    ///
    /// Returns [`ReadStatus::Closed`] once the source is closed or `cancel`
    /// fires while waiting.
    fn read_frame(
        &mut self,
        frame: &mut Frame<S>,
        cancel: &CancelToken,
    ) -> Result<ReadStatus, DeviceError>;

    /// Release the underlying stream; idempotent
    fn close(&mut self);

    /// Input overruns tolerated so far
    fn overrun_count(&self) -> u64 {
        0
    }
}

/// Replays prepared frames, then reports closed
///
/// Items may also be errors, which lets tests inject driver hiccups.
#[derive(Debug)]
pub struct ReplaySource<S> {
    items: VecDeque<Result<Frame<S>, DeviceError>>,
    channel_count: usize,
    frame_size: usize,
    sample_rate: u32,
    closed: bool,
}

impl<S: Sample> ReplaySource<S> {
    /// Create a source replaying `frames` in order
    ///
    /// # Panics
    /// Panics if the frames differ in shape.
    pub fn new(frames: Vec<Frame<S>>, sample_rate: u32) -> Self {
        Self::with_items(frames.into_iter().map(Ok).collect(), sample_rate)
    }

    /// Create a source replaying frames and errors in order
    ///
    /// # Panics
    /// Panics if the frames differ in shape or no frame is given.
    pub fn with_items(items: Vec<Result<Frame<S>, DeviceError>>, sample_rate: u32) -> Self {
        let mut shapes = items
            .iter()
            .filter_map(|item| item.as_ref().ok())
            .map(|f| (f.channel_count(), f.len()));
        let (channel_count, frame_size) = shapes.next().unwrap_or((0, 0));
        assert!(channel_count > 0, "replay needs at least one frame");
        assert!(
            shapes.all(|shape| shape == (channel_count, frame_size)),
            "replayed frames must share one shape"
        );
        Self {
            items: items.into(),
            channel_count,
            frame_size,
            sample_rate,
            closed: false,
        }
    }

    /// Split one continuous per-channel recording into frames
    ///
    /// A trailing partial frame is dropped.
    pub fn from_recording(channels: Vec<Vec<S>>, frame_size: usize, sample_rate: u32) -> Self {
        let samples = channels.first().map(Vec::len).unwrap_or(0);
        let frames = (0..samples / frame_size)
            .map(|i| {
                let range = i * frame_size..(i + 1) * frame_size;
                Frame::from_channels(channels.iter().map(|c| c[range.clone()].to_vec()).collect())
            })
            .collect();
        Self::new(frames, sample_rate)
    }

    /// Items not yet replayed
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl<S: Sample> FrameSource<S> for ReplaySource<S> {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(
        &mut self,
        frame: &mut Frame<S>,
        cancel: &CancelToken,
    ) -> Result<ReadStatus, DeviceError> {
        if self.closed || cancel.is_cancelled() {
            return Ok(ReadStatus::Closed);
        }
        match self.items.pop_front() {
            Some(Ok(next)) => {
                *frame = next;
                Ok(ReadStatus::Frame)
            }
            Some(Err(e)) => Err(e),
            None => Ok(ReadStatus::Closed),
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.items.clear();
    }
}

/// Endless source of generated pulse trains
///
/// Every channel carries the same train. When paced, each read sleeps until
/// the frame's wall-clock duration has elapsed, like a real sound card.
#[derive(Debug)]
pub struct SimulatedSource {
    generator: PulseGenerator,
    channel_count: usize,
    frame_size: usize,
    sample_rate: u32,
    paced: bool,
    next_deadline: Option<Instant>,
    scratch: Vec<f32>,
    closed: bool,
}

impl SimulatedSource {
    /// Create an unpaced source
    pub fn new(
        generator: PulseGenerator,
        channel_count: usize,
        frame_size: usize,
        sample_rate: u32,
    ) -> Self {
        Self {
            generator,
            channel_count,
            frame_size,
            sample_rate,
            paced: false,
            next_deadline: None,
            scratch: vec![0.0; frame_size],
            closed: false,
        }
    }

    /// Pace reads to the sample rate
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Samples generated so far
    pub fn position(&self) -> u64 {
        self.generator.position()
    }

    fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size as f64 / self.sample_rate.max(1) as f64)
    }

    fn wait_for_deadline(&mut self, cancel: &CancelToken) -> bool {
        let now = Instant::now();
        let deadline = *self.next_deadline.get_or_insert(now);
        let mut remaining = deadline.saturating_duration_since(now);
        while !remaining.is_zero() {
            if cancel.is_cancelled() {
                return false;
            }
            let step = remaining.min(Duration::from_millis(5));
            std::thread::sleep(step);
            remaining -= step;
        }
        self.next_deadline = Some(deadline + self.frame_duration());
        true
    }
}

impl<S: Sample> FrameSource<S> for SimulatedSource {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(
        &mut self,
        frame: &mut Frame<S>,
        cancel: &CancelToken,
    ) -> Result<ReadStatus, DeviceError> {
        if self.closed || cancel.is_cancelled() {
            return Ok(ReadStatus::Closed);
        }
        if self.paced && !self.wait_for_deadline(cancel) {
            return Ok(ReadStatus::Closed);
        }

        for value in self.scratch.iter_mut() {
            *value = self.generator.next_value();
        }
        let samples: Vec<S> = self.scratch.iter().map(|&v| S::from_f32(v)).collect();
        *frame = Frame::from_channels(vec![samples; self.channel_count]);
        Ok(ReadStatus::Frame)
    }

    fn close(&mut self) {
        if !self.closed {
            tracing::debug!(position = self.generator.position(), "Simulated source closed");
        }
        self.closed = true;
    }
}
