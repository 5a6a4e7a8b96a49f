//! Sample types and per-channel frames
//!
//! The engine works on signed fixed-width integer samples as delivered by
//! the sound card ADC. Thresholds and hysteresis are expressed in the same
//! raw counts, so every sample type widens losslessly to `i32`.

use std::fmt;

/// A signed integer ADC sample with a known full-scale value
pub trait Sample: Copy + Default + PartialEq + PartialOrd + fmt::Debug + Send + 'static {
    /// Magnitude of the most negative representable value (2^(bits-1))
    const FULL_SCALE: i64;

    /// Widen to `i32` without loss
    fn to_i32(self) -> i32;

    /// Convert to `f32` for feature extraction
    fn to_f32(self) -> f32 {
        self.to_i32() as f32
    }

    /// Round and saturate a synthesized value into the sample range
    fn from_f32(value: f32) -> Self;
}

impl Sample for i8 {
    const FULL_SCALE: i64 = 1 << 7;

    fn to_i32(self) -> i32 {
        self as i32
    }

    fn from_f32(value: f32) -> Self {
        value.round() as i8
    }
}

impl Sample for i16 {
    const FULL_SCALE: i64 = 1 << 15;

    fn to_i32(self) -> i32 {
        self as i32
    }

    fn from_f32(value: f32) -> Self {
        value.round() as i16
    }
}

impl Sample for i32 {
    const FULL_SCALE: i64 = 1 << 31;

    fn to_i32(self) -> i32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value.round() as i32
    }
}

/// One read of the audio stream, split into the configured channels
///
/// All channel vectors have the same length (the frame size).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<S> {
    channels: Vec<Vec<S>>,
}

impl<S: Sample> Frame<S> {
    /// Create a zero-filled frame
    pub fn zeroed(channel_count: usize, frame_size: usize) -> Self {
        Self {
            channels: vec![vec![S::default(); frame_size]; channel_count],
        }
    }

    /// Build a frame from already separated channel data
    ///
    /// # Panics
    /// Panics if the channels differ in length.
    pub fn from_channels(channels: Vec<Vec<S>>) -> Self {
        if let Some(first) = channels.first() {
            let len = first.len();
            assert!(
                channels.iter().all(|c| c.len() == len),
                "all channels of a frame must have the same length"
            );
        }
        Self { channels }
    }

    /// Decode interleaved stream data into the selected channels
    ///
    /// # Arguments
    /// * `data` - Interleaved samples, `stream_channels` values per sample instant
    /// * `stream_channels` - Number of channels in the interleaved stream
    /// * `channels` - 1-based stream channel indices to keep, in output order
    pub fn from_interleaved(data: &[S], stream_channels: usize, channels: &[u16]) -> Self {
        let mut frame = Self::zeroed(channels.len(), data.len() / stream_channels.max(1));
        frame.fill_from_interleaved(data, stream_channels, channels);
        frame
    }

    /// Like [`Self::from_interleaved`], but reuses this frame's storage
    pub fn fill_from_interleaved(&mut self, data: &[S], stream_channels: usize, channels: &[u16]) {
        let stream_channels = stream_channels.max(1);
        let frame_size = data.len() / stream_channels;
        self.channels.resize_with(channels.len(), Vec::new);
        for (out, &channel) in self.channels.iter_mut().zip(channels) {
            let offset = channel as usize - 1;
            out.clear();
            out.extend(
                data.chunks_exact(stream_channels)
                    .take(frame_size)
                    .map(|instant| instant[offset]),
            );
        }
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// True if the frame holds no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples of one channel (0-based position in the channel list)
    pub fn channel(&self, index: usize) -> &[S] {
        &self.channels[index]
    }

    /// All channels
    pub fn channels(&self) -> &[Vec<S>] {
        &self.channels
    }

    /// Consume the frame, returning the channel vectors
    pub fn into_channels(self) -> Vec<Vec<S>> {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scale() {
        assert_eq!(<i8 as Sample>::FULL_SCALE, 128);
        assert_eq!(<i16 as Sample>::FULL_SCALE, 32768);
        assert_eq!(<i32 as Sample>::FULL_SCALE, 2_147_483_648);
    }

    #[test]
    fn test_from_f32_saturates() {
        assert_eq!(i16::from_f32(1234.6), 1235);
        assert_eq!(i16::from_f32(1.0e6), i16::MAX);
        assert_eq!(i8::from_f32(-300.0), i8::MIN);
    }

    #[test]
    fn test_deinterleave_two_channels() {
        let data: Vec<i16> = vec![1, -1, 2, -2, 3, -3];
        let frame = Frame::from_interleaved(&data, 2, &[1, 2]);
        assert_eq!(frame.channel_count(), 2);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.channel(0), &[1, 2, 3]);
        assert_eq!(frame.channel(1), &[-1, -2, -3]);
    }

    #[test]
    fn test_deinterleave_selects_channel() {
        let data: Vec<i16> = vec![1, 10, 2, 20, 3, 30];
        let frame = Frame::from_interleaved(&data, 2, &[2]);
        assert_eq!(frame.channel_count(), 1);
        assert_eq!(frame.channel(0), &[10, 20, 30]);
    }

    #[test]
    fn test_fill_reuses_storage() {
        let mut frame = Frame::<i16>::zeroed(1, 4);
        frame.fill_from_interleaved(&[5, 6, 7, 8], 1, &[1]);
        assert_eq!(frame.channel(0), &[5, 6, 7, 8]);
    }

    #[test]
    #[should_panic]
    fn test_ragged_channels_rejected() {
        let _ = Frame::from_channels(vec![vec![0i16; 3], vec![0i16; 2]]);
    }
}
