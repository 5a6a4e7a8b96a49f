//! Multi-frame circular capture buffer
//!
//! The ring owns `slots` frame-sized regions per channel, laid out
//! contiguously as `slots × frame_size` samples. Frames are written in
//! order into the slot under the write pointer; the analysis pointer names
//! the oldest slot not yet scanned for a trigger and always lags the write
//! pointer, so a scanned slot is never the next one to be overwritten.
//!
//! Positions in the ring's logical address space (`0..len()`) are called
//! global indices. They wrap, which is what lets a window reach back into
//! the previous slot when a trigger sits near the start of a slot.

use crate::audio::sample::{Frame, Sample};
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A position in a ring of `bound` elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor {
    index: usize,
    bound: usize,
}

impl RingCursor {
    /// Cursor at `index` (taken modulo `bound`)
    pub fn new(index: usize, bound: usize) -> RingCursor {
        RingCursor {
            index: index % bound,
            bound,
        }
    }

    /// Index within the ring
    pub fn index(self) -> usize {
        self.index
    }
}

impl Add<usize> for RingCursor {
    type Output = RingCursor;

    fn add(self, offset: usize) -> Self::Output {
        RingCursor {
            index: (self.index + offset % self.bound) % self.bound,
            bound: self.bound,
        }
    }
}

impl AddAssign<usize> for RingCursor {
    fn add_assign(&mut self, offset: usize) {
        *self = *self + offset
    }
}

impl Sub<usize> for RingCursor {
    type Output = RingCursor;

    fn sub(self, offset: usize) -> Self::Output {
        RingCursor {
            index: (self.index + self.bound - offset % self.bound) % self.bound,
            bound: self.bound,
        }
    }
}

impl SubAssign<usize> for RingCursor {
    fn sub_assign(&mut self, offset: usize) {
        *self = *self - offset
    }
}

/// Circular capture buffer of `slots` frames per channel
#[derive(Debug)]
pub struct RingCapture<S> {
    frame_size: usize,
    /// One `slots * frame_size` arena per channel
    arenas: Vec<Vec<S>>,
    /// Next slot to fill
    write: RingCursor,
    /// Oldest slot not yet scanned
    analysis: RingCursor,
    /// Stream frame number stored in each slot
    slot_frames: Vec<Option<u64>>,
    frames_written: u64,
}

impl<S: Sample> RingCapture<S> {
    /// Create an empty ring
    ///
    /// # Panics
    /// Panics if `slots < 3` or `frame_size == 0`; both are rejected earlier
    /// by configuration validation.
    pub fn new(channel_count: usize, frame_size: usize, slots: usize) -> Self {
        assert!(slots >= 3, "ring needs at least 3 slots");
        assert!(frame_size > 0, "frame size must be > 0");
        Self {
            frame_size,
            arenas: vec![vec![S::default(); slots * frame_size]; channel_count],
            write: RingCursor::new(0, slots),
            analysis: RingCursor::new(0, slots),
            slot_frames: vec![None; slots],
            frames_written: 0,
        }
    }

    /// Number of slots
    pub fn slots(&self) -> usize {
        self.slot_frames.len()
    }

    /// Samples per slot
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Logical length of the ring (`slots × frame_size`)
    pub fn len(&self) -> usize {
        self.slots() * self.frame_size
    }

    /// True if the ring has zero length (never, given the constructor checks)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.arenas.len()
    }

    /// Frames written since creation
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Store `frame` in the next free slot and advance the write pointer
    ///
    /// If the write pointer catches up with an unscanned slot, the analysis
    /// pointer is pushed forward so it keeps lagging; the skipped slot is
    /// lost for triggering but the ring stays consistent.
    ///
    /// # Panics
    /// Panics if the frame shape does not match the ring.
    pub fn write(&mut self, frame: &Frame<S>) {
        assert_eq!(frame.channel_count(), self.channel_count());
        assert_eq!(frame.len(), self.frame_size);

        let slot = self.write.index();
        let range = slot * self.frame_size..(slot + 1) * self.frame_size;
        for (arena, samples) in self.arenas.iter_mut().zip(frame.channels()) {
            arena[range.clone()].copy_from_slice(samples);
        }
        self.slot_frames[slot] = Some(self.frames_written);
        self.frames_written += 1;
        self.write += 1;

        if self.write == self.analysis {
            tracing::debug!(slot = self.analysis.index(), "Ring overtook unscanned slot");
            self.analysis += 1;
        }
    }

    /// Read-only view of one slot of one channel
    pub fn segment(&self, slot: usize, channel: usize) -> &[S] {
        let start = slot * self.frame_size;
        &self.arenas[channel][start..start + self.frame_size]
    }

    /// Most recently written slot
    pub fn newest_slot(&self) -> usize {
        (self.write - 1).index()
    }

    /// Oldest slot not yet scanned
    pub fn analysis_slot(&self) -> usize {
        self.analysis.index()
    }

    /// Move the analysis pointer forward one slot
    pub fn advance_analysis(&mut self) {
        debug_assert!(self.analysis + 1 != self.write, "analysis must lag the write pointer");
        self.analysis += 1;
    }

    /// Point the analysis pointer at the newest slot
    ///
    /// Used once after priming: the primed slots only provide pre-trigger
    /// history and are not scanned themselves.
    pub fn sync_analysis(&mut self) {
        self.analysis = self.write - 1;
    }

    /// True if the analysis slot has a newer, fully written slot after it
    ///
    /// Scanning requires one such slot so that a trigger near the end of the
    /// analysis slot still has post-trigger samples available.
    pub fn has_scannable_slot(&self) -> bool {
        self.frames_written > 0 && self.analysis != self.write - 1
    }

    /// Stream frame number held by `slot`, if written
    pub fn slot_frame(&self, slot: usize) -> Option<u64> {
        self.slot_frames[slot]
    }

    /// Global index of sample `offset` within `slot`
    pub fn global_index(&self, slot: usize, offset: usize) -> usize {
        slot * self.frame_size + offset
    }

    /// Copy `length` samples of `channel` starting at global index `start`
    ///
    /// `start` may be negative or `start + length` may exceed the ring; the
    /// read wraps around, splicing the tail and head segments, and always
    /// returns exactly `length` samples.
    ///
    /// # Panics
    /// Panics if `length` exceeds the ring length.
    pub fn copy_wrapped(&self, channel: usize, start: isize, length: usize) -> Vec<S> {
        let total = self.len();
        assert!(length <= total, "window longer than the ring");
        let arena = &self.arenas[channel];
        let start = start.rem_euclid(total as isize) as usize;
        let mut out = Vec::with_capacity(length);
        if start + length <= total {
            out.extend_from_slice(&arena[start..start + length]);
        } else {
            out.extend_from_slice(&arena[start..]);
            out.extend_from_slice(&arena[..length - (total - start)]);
        }
        out
    }
}
