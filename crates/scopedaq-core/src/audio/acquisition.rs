//! Triggered and free-running acquisition
//!
//! [`AcquisitionLoop`] reads frames from a [`FrameSource`] on the calling
//! thread and turns them into [`Event`]s:
//!
//! - Free-running (trigger off): every frame becomes one event carrying
//!   the raw frame.
//! - Triggered: frames are written into a [`RingCapture`]; the slot behind
//!   the newest one is scanned for a hysteresis-qualified edge and every
//!   trigger yields a window copied out of the ring. Trigger arming carries
//!   over from one slot to the next, so edges on slot boundaries fire. With the pulse filter
//!   on, windows whose pulse is not bipolar are dropped without consuming
//!   a sequence number.
//!
//! With the trigger on, [`AcquisitionLoop::next_event`] blocks until a
//! trigger occurs; with no signal crossing the threshold it waits forever
//! unless the [`CancelToken`] fires.

use crate::audio::pulse::{PulseAnalyzer, PulseFeatures};
use crate::audio::ring::RingCapture;
use crate::audio::sample::{Frame, Sample};
use crate::audio::source::{CancelToken, DeviceError, FrameSource, ReadStatus};
use crate::audio::trigger::{ArmState, TriggerConfig, TriggerDetector};
use crate::audio::window::{Window, WindowExtractor};
use crate::config::{ConfigError, OsciConfig};
use crate::stats::store::StatsStore;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that end an acquisition session
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "Source delivers {source_channels} channels x {source_frame} samples, \
         configured {channels} x {frame_size}"
    )]
    SourceMismatch {
        source_channels: usize,
        source_frame: usize,
        channels: usize,
        frame_size: usize,
    },

    #[error("Giving up after {count} consecutive read errors (last: {last})")]
    TooManyErrors { count: u32, last: DeviceError },
}

/// Acquisition state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcqState {
    /// Created, nothing read yet
    Idle,
    /// Trigger enabled, scanning for an edge
    Armed,
    /// A window was just delivered
    Captured,
    /// Trigger disabled, delivering raw frames
    FreeRunning,
    /// Closed; every further call returns no event
    Stopped,
}

/// One delivered acquisition result
#[derive(Debug, Clone)]
pub struct Event<S> {
    /// 1-based, strictly increasing by one per delivered event
    pub sequence: u64,
    /// Offset of the trigger sample within `data`; `None` when free-running
    pub trigger_offset: Option<usize>,
    /// Window around the trigger, or the raw frame when free-running
    pub data: Window<S>,
    /// Absolute stream index of the trigger sample, or of the frame's first
    /// sample when free-running
    pub stream_position: u64,
    /// Wall-clock time the event was produced
    pub time: DateTime<Utc>,
    /// Pulse features when the pulse filter is on
    pub features: Option<PulseFeatures>,
}

/// Frame-by-frame trigger, capture and analysis driver
pub struct AcquisitionLoop<S: Sample, F: FrameSource<S>> {
    config: OsciConfig,
    source: F,
    trigger: TriggerConfig,
    detector: TriggerDetector,
    extractor: WindowExtractor,
    analyzer: Option<PulseAnalyzer>,
    ring: RingCapture<S>,
    frame: Frame<S>,
    state: AcqState,
    sequence: u64,
    frames_read: u64,
    /// Scan offset within the analysis slot after a trigger in it
    resume_at: Option<usize>,
    /// Trigger arming carried from one scanned slot into the next
    arm: ArmState,
    consecutive_errors: u32,
    cancel: CancelToken,
    stats: StatsStore,
}

impl<S: Sample, F: FrameSource<S>> AcquisitionLoop<S, F> {
    /// Create a loop for `config` reading from `source`
    ///
    /// The configuration is validated here, once; the source must deliver
    /// frames of the configured shape.
    pub fn new(config: OsciConfig, source: F) -> Result<Self, AcquisitionError> {
        config.validate_for::<S>()?;

        let channels = config.channels.len();
        let frame_size = config.number_of_samples;
        if source.channel_count() != channels || source.frame_size() != frame_size {
            return Err(AcquisitionError::SourceMismatch {
                source_channels: source.channel_count(),
                source_frame: source.frame_size(),
                channels,
                frame_size,
            });
        }

        let trigger = config.trigger();
        let analyzer = config.pulse_filter.then(|| {
            PulseAnalyzer::new(config.overshoot_fraction as f32, config.max_peak_separation())
        });

        Ok(Self {
            detector: TriggerDetector::from_config(&trigger),
            extractor: WindowExtractor::new(config.window_length, config.pre_trigger_fraction),
            ring: RingCapture::new(channels, frame_size, config.ring_slots),
            frame: Frame::zeroed(channels, frame_size),
            trigger,
            analyzer,
            source,
            config,
            state: AcqState::Idle,
            sequence: 0,
            frames_read: 0,
            resume_at: None,
            arm: ArmState::Idle,
            consecutive_errors: 0,
            cancel: CancelToken::new(),
            stats: StatsStore::new(),
        })
    }

    /// Use `cancel` instead of the loop's own token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the loop at its next check
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current state
    pub fn state(&self) -> AcqState {
        self.state
    }

    /// Sequence number of the last delivered event (0 before the first)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Frames read from the source so far
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Validated configuration
    pub fn config(&self) -> &OsciConfig {
        &self.config
    }

    /// Number of decoded channels per event
    pub fn channel_count(&self) -> usize {
        self.config.channels.len()
    }

    /// Session statistics
    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    /// Session statistics, e.g. to record rates
    pub fn stats_mut(&mut self) -> &mut StatsStore {
        &mut self.stats
    }

    /// Leave `Idle`: prime the ring when triggering, else go free-running
    ///
    /// Priming fills `slots - 1` frames once so that the first scanned slot
    /// already has pre-trigger history behind it. Calling `start` again is a
    /// no-op.
    pub fn start(&mut self) -> Result<(), AcquisitionError> {
        if self.state != AcqState::Idle {
            return Ok(());
        }

        if !self.trigger.active {
            tracing::info!(
                channels = self.channel_count(),
                frame_size = self.config.number_of_samples,
                "Acquisition started (free-running)"
            );
            self.state = AcqState::FreeRunning;
            return Ok(());
        }

        for _ in 0..self.ring.slots() - 1 {
            if !self.read_next_frame()? {
                self.close();
                return Ok(());
            }
            self.ring.write(&self.frame);
        }
        self.ring.sync_analysis();
        self.arm = ArmState::Idle;
        self.state = AcqState::Armed;

        tracing::info!(
            channel = self.trigger.channel + 1,
            threshold = self.trigger.threshold,
            hysteresis = self.trigger.hysteresis,
            edge = ?self.trigger.edge,
            slots = self.ring.slots(),
            window = self.extractor.length(),
            pre_trigger = self.extractor.pre_samples(),
            pulse_filter = self.analyzer.is_some(),
            "Acquisition started (triggered)"
        );
        Ok(())
    }

    /// Block until the next event
    ///
    /// Returns `Ok(None)` once the loop is stopped: after [`Self::close`],
    /// cancellation, or the source closing. Transient read errors are
    /// counted and skipped until `max_consecutive_errors` occur in a row.
    pub fn next_event(&mut self) -> Result<Option<Event<S>>, AcquisitionError> {
        match self.state {
            AcqState::Stopped => return Ok(None),
            AcqState::Idle => {
                self.start()?;
                if self.state == AcqState::Stopped {
                    return Ok(None);
                }
            }
            _ => {}
        }
        if self.cancel.is_cancelled() {
            self.close();
            return Ok(None);
        }

        let event = if self.trigger.active {
            self.next_triggered()?
        } else {
            self.next_free_running()?
        };
        if event.is_none() {
            self.close();
        }
        Ok(event)
    }

    fn next_free_running(&mut self) -> Result<Option<Event<S>>, AcquisitionError> {
        if !self.read_next_frame()? {
            return Ok(None);
        }
        let stream_position = (self.frames_read - 1) * self.config.number_of_samples as u64;
        Ok(Some(self.emit(self.frame.clone(), None, stream_position, None)))
    }

    fn next_triggered(&mut self) -> Result<Option<Event<S>>, AcquisitionError> {
        self.state = AcqState::Armed;
        loop {
            while self.ring.has_scannable_slot() {
                let slot = self.ring.analysis_slot();
                let start = self.resume_at.take().unwrap_or(0);
                let samples = self.ring.segment(slot, self.trigger.channel);
                let Some(offset) = self.detector.scan_continued(samples, start, &mut self.arm)
                else {
                    self.ring.advance_analysis();
                    continue;
                };
                self.resume_at = Some(offset + 1);

                let window = self
                    .extractor
                    .extract(&self.ring, self.ring.global_index(slot, offset));
                let frame_number = self.ring.slot_frame(slot).unwrap_or(0);
                let stream_position =
                    frame_number * self.config.number_of_samples as u64 + offset as u64;

                let features = match &self.analyzer {
                    Some(analyzer) => match analyzer.analyze(
                        window.channel(self.trigger.channel),
                        self.extractor.pre_samples(),
                        self.config.trg_falling,
                    ) {
                        Ok(features) => Some(features),
                        Err(rejection) => {
                            tracing::debug!(stream_position, %rejection, "Pulse rejected");
                            self.stats.record_rejection(&rejection);
                            continue;
                        }
                    },
                    None => None,
                };

                self.state = AcqState::Captured;
                let trigger_offset = Some(self.extractor.pre_samples());
                return Ok(Some(self.emit(window, trigger_offset, stream_position, features)));
            }

            if !self.read_next_frame()? {
                return Ok(None);
            }
            self.ring.write(&self.frame);
        }
    }

    fn emit(
        &mut self,
        data: Window<S>,
        trigger_offset: Option<usize>,
        stream_position: u64,
        features: Option<PulseFeatures>,
    ) -> Event<S> {
        self.sequence += 1;
        self.stats.record_event(features.as_ref());
        Event {
            sequence: self.sequence,
            trigger_offset,
            data,
            stream_position,
            time: Utc::now(),
            features,
        }
    }

    /// Read one frame into `self.frame`; `false` if the source is done
    fn read_next_frame(&mut self) -> Result<bool, AcquisitionError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            match self.source.read_frame(&mut self.frame, &self.cancel) {
                Ok(ReadStatus::Frame) => {
                    self.consecutive_errors = 0;
                    self.frames_read += 1;
                    self.stats.record_frame();
                    self.stats.set_overruns(self.source.overrun_count());
                    return Ok(true);
                }
                Ok(ReadStatus::Closed) => return Ok(false),
                Err(e) if e.is_transient() => {
                    self.consecutive_errors += 1;
                    tracing::warn!(
                        error = %e,
                        consecutive = self.consecutive_errors,
                        "Read error, continuing"
                    );
                    self.stats.record_error(e.to_string());
                    if self.consecutive_errors >= self.config.max_consecutive_errors {
                        tracing::error!(count = self.consecutive_errors, "Too many read errors");
                        let count = self.consecutive_errors;
                        self.close();
                        return Err(AcquisitionError::TooManyErrors { count, last: e });
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Fatal read error");
                    self.close();
                    return Err(e.into());
                }
            }
        }
    }

    /// Stop acquiring and release the source; idempotent
    pub fn close(&mut self) {
        if self.state == AcqState::Stopped {
            return;
        }
        self.source.close();
        self.state = AcqState::Stopped;
        let stats = self.stats.stats();
        tracing::info!(
            events = self.sequence,
            frames = self.frames_read,
            rejected = stats.rejections.total(),
            errors = stats.transient_errors,
            overruns = stats.overruns,
            "Acquisition stopped"
        );
    }
}

impl<S: Sample, F: FrameSource<S>> Drop for AcquisitionLoop<S, F> {
    fn drop(&mut self) {
        self.close();
    }
}
