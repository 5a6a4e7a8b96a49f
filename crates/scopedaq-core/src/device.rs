//! Generic data-acquisition device capability
//!
//! Any sensor driver exposes `init`, `acquire_data` and `close`; a caller
//! polling several devices can treat the sound-card oscilloscope like any
//! other one. The acquisition loop reports one value per channel per event:
//! the peak-to-peak amplitude of the delivered samples.

use crate::audio::acquisition::{AcquisitionError, AcquisitionLoop};
use crate::audio::sample::Sample;
use crate::audio::source::{DeviceError, FrameSource};

/// A device delivering one value per channel per acquisition
pub trait Device {
    /// Prepare the device; failures are fatal and not retried
    fn init(&mut self) -> Result<(), DeviceError>;

    /// Number of values written by [`Self::acquire_data`]
    fn channel_count(&self) -> usize;

    /// Block for the next reading and write it into `buffer`
    ///
    /// At most `buffer.len()` channels are written.
    fn acquire_data(&mut self, buffer: &mut [f64]) -> Result<(), DeviceError>;

    /// Release the device; idempotent and best-effort
    fn close(&mut self);
}

/// Peak-to-peak amplitude of `samples` in ADC counts
pub fn peak_to_peak<S: Sample>(samples: &[S]) -> f64 {
    let mut values = samples.iter().map(|s| s.to_i32());
    let Some(first) = values.next() else {
        return 0.0;
    };
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (max as i64 - min as i64) as f64
}

impl From<AcquisitionError> for DeviceError {
    fn from(error: AcquisitionError) -> Self {
        match error {
            AcquisitionError::Device(e) => e,
            AcquisitionError::Config(e) => DeviceError::UnsupportedConfig(e.to_string()),
            other => DeviceError::StreamFailed(other.to_string()),
        }
    }
}

impl<S: Sample, F: FrameSource<S>> Device for AcquisitionLoop<S, F> {
    fn init(&mut self) -> Result<(), DeviceError> {
        self.start()?;
        Ok(())
    }

    fn channel_count(&self) -> usize {
        AcquisitionLoop::channel_count(self)
    }

    fn acquire_data(&mut self, buffer: &mut [f64]) -> Result<(), DeviceError> {
        let event = self.next_event()?.ok_or(DeviceError::Closed)?;
        for (value, channel) in buffer.iter_mut().zip(event.data.channels()) {
            *value = peak_to_peak(channel);
        }
        Ok(())
    }

    fn close(&mut self) {
        AcquisitionLoop::close(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sample::Frame;
    use crate::audio::source::ReplaySource;
    use crate::config::OsciConfig;

    #[test]
    fn test_peak_to_peak() {
        assert_eq!(peak_to_peak::<i16>(&[]), 0.0);
        assert_eq!(peak_to_peak(&[3i16, -4, 10, 0]), 14.0);
        assert_eq!(peak_to_peak(&[i16::MIN, i16::MAX]), 65535.0);
    }

    #[test]
    fn test_acquire_data_per_channel() {
        let frame = Frame::from_channels(vec![vec![0i16, 100, -50], vec![7i16, 7, 7]]);
        let source = ReplaySource::new(vec![frame], 48000);
        let config = OsciConfig {
            number_of_samples: 3,
            channels: vec![1, 2],
            ..OsciConfig::default()
        };
        let mut device = AcquisitionLoop::new(config, source).unwrap();
        device.init().unwrap();
        assert_eq!(Device::channel_count(&device), 2);

        let mut buffer = [0.0; 2];
        device.acquire_data(&mut buffer).unwrap();
        assert_eq!(buffer, [150.0, 0.0]);

        assert_eq!(device.acquire_data(&mut buffer), Err(DeviceError::Closed));
        Device::close(&mut device);
        Device::close(&mut device);
    }
}
