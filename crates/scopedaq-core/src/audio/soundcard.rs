//! Sound-card input via cpal
//!
//! The cpal input callback pushes interleaved samples into a lock-free
//! ring buffer; [`SoundCardSource::read_frame`] pops one frame at a time on
//! the acquisition thread. Overruns drop whole sample instants and are only
//! counted, so the read loop never fails on a full buffer.

use crate::audio::sample::{Frame, Sample};
use crate::audio::source::{CancelToken, DeviceError, FrameSource, ReadStatus};
use crate::config::OsciConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Frames of headroom in the callback ring buffer
const RING_FRAMES: usize = 16;

/// Poll interval while waiting for a frame
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Sample rates checked by [`list_devices`]
const COMMON_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// Input device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Whether this is the default input device
    pub is_default: bool,
    /// Supported sample rates among the common ones
    pub sample_rates: Vec<u32>,
    /// Number of input channels
    pub input_channels: u16,
}

/// List available input devices
pub fn list_devices() -> Result<Vec<DeviceInfo>, DeviceError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let mut devices = Vec::new();

    for device in host
        .input_devices()
        .map_err(|e| DeviceError::Host(e.to_string()))?
    {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let input_channels = device
            .default_input_config()
            .map(|c| c.channels())
            .unwrap_or(0);

        let mut sample_rates = Vec::new();
        if let Ok(configs) = device.supported_input_configs() {
            for config in configs {
                for &rate in &COMMON_RATES {
                    if (config.min_sample_rate().0..=config.max_sample_rate().0).contains(&rate)
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }
        }
        sample_rates.sort();

        devices.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            sample_rates,
            input_channels,
        });
    }

    Ok(devices)
}

/// Continuous sound-card input delivering decoded frames
pub struct SoundCardSource<S: Sample> {
    device_name: String,
    channels: Vec<u16>,
    stream_channels: usize,
    frame_size: usize,
    sample_rate: u32,
    stream: Option<Stream>,
    consumer: Option<HeapCons<S>>,
    running: Arc<AtomicBool>,
    overruns: Arc<AtomicU64>,
    stream_error: Arc<Mutex<Option<String>>>,
    interleaved: Vec<S>,
}

impl<S: Sample + SizedSample> SoundCardSource<S> {
    /// Open and start an input stream for `config`
    ///
    /// Any failure here is fatal: nothing is retried.
    pub fn open(config: &OsciConfig) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = match &config.device {
            Some(name) => host
                .input_devices()
                .map_err(|e| DeviceError::Host(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| DeviceError::DeviceNotFound(name.clone()))?,
            None => host
                .default_input_device()
                .ok_or(DeviceError::NoInputDevice)?,
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let stream_channels = config.stream_channels();
        let frame_size = config.number_of_samples;
        let stream_config = StreamConfig {
            channels: stream_channels as u16,
            sample_rate: SampleRate(config.sampling_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = HeapRb::<S>::new(frame_size * stream_channels * RING_FRAMES);
        let (mut producer, consumer) = ring.split();

        let running = Arc::new(AtomicBool::new(true));
        let overruns = Arc::new(AtomicU64::new(0));
        let stream_error = Arc::new(Mutex::new(None));

        let input_running = Arc::clone(&running);
        let input_overruns = Arc::clone(&overruns);
        let input_error = Arc::clone(&stream_error);
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[S], _: &cpal::InputCallbackInfo| {
                    if !input_running.load(Ordering::Relaxed) {
                        return;
                    }
                    // whole instants only, so channels stay aligned
                    let room = producer.vacant_len() / stream_channels * stream_channels;
                    let take = data.len().min(room);
                    producer.push_slice(&data[..take]);
                    if take < data.len() {
                        let total = input_overruns.fetch_add(1, Ordering::Relaxed) + 1;
                        tracing::debug!(
                            dropped = data.len() - take,
                            overruns = total,
                            "Input overrun"
                        );
                    }
                },
                move |err| {
                    tracing::error!("Input stream error: {}", err);
                    if let Ok(mut latched) = input_error.lock() {
                        latched.get_or_insert_with(|| err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::StreamConfigNotSupported => DeviceError::UnsupportedConfig(
                    format!("{} channels @ {} Hz", stream_channels, config.sampling_rate),
                ),
                other => DeviceError::StreamOpen(other.to_string()),
            })?;
        stream
            .play()
            .map_err(|e| DeviceError::StreamOpen(e.to_string()))?;

        tracing::info!(
            device = %device_name,
            rate = config.sampling_rate,
            channels = stream_channels,
            frame_size,
            "Sound card input started"
        );

        Ok(Self {
            device_name,
            channels: config.channels.clone(),
            stream_channels,
            frame_size,
            sample_rate: config.sampling_rate,
            stream: Some(stream),
            consumer: Some(consumer),
            running,
            overruns,
            stream_error,
            interleaved: vec![S::default(); frame_size * stream_channels],
        })
    }

    /// Name of the opened device
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn latched_error(&self) -> Option<String> {
        self.stream_error.lock().ok().and_then(|e| e.clone())
    }
}

impl<S: Sample + SizedSample> FrameSource<S> for SoundCardSource<S> {
    fn channel_count(&self) -> usize {
        self.channels.len()
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
        let needed = self.interleaved.len();
        loop {
            if cancel.is_cancelled() {
                return Ok(ReadStatus::Closed);
            }
            if let Some(error) = self.latched_error() {
                return Err(DeviceError::StreamFailed(error));
            }
            let Some(consumer) = self.consumer.as_mut() else {
                return Ok(ReadStatus::Closed);
            };
            if consumer.occupied_len() >= needed {
                consumer.pop_slice(&mut self.interleaved);
                frame.fill_from_interleaved(&self.interleaved, self.stream_channels, &self.channels);
                return Ok(ReadStatus::Frame);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if self.stream.take().is_some() {
            tracing::info!(
                device = %self.device_name,
                overruns = self.overruns.load(Ordering::Relaxed),
                "Sound card input stopped"
            );
        }
        self.consumer = None;
    }

    fn overrun_count(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

impl<S: Sample> Drop for SoundCardSource<S> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.stream = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices() {
        // May find nothing on CI machines without audio, but must not panic
        match list_devices() {
            Ok(devices) => {
                for device in &devices {
                    println!("  - {} (in:{})", device.name, device.input_channels);
                }
            }
            Err(e) => println!("No audio host available: {}", e),
        }
    }

    #[test]
    fn test_unknown_device_is_reported() {
        let config = OsciConfig {
            device: Some("no such sound card".to_string()),
            ..OsciConfig::default()
        };
        match SoundCardSource::<i16>::open(&config) {
            Err(DeviceError::DeviceNotFound(name)) => assert_eq!(name, "no such sound card"),
            Err(DeviceError::Host(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opened a device that does not exist"),
        }
    }
}
