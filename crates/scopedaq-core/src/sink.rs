//! Event consumers
//!
//! Sinks receive events from the acquisition thread and must never stall
//! it for long: the [`mailbox`] hands events to another thread with
//! overwrite-on-full semantics, and the file sinks only buffer writes.

use crate::audio::acquisition::Event;
use crate::audio::pulse::FWHM_UNDETERMINED;
use crate::audio::sample::Sample;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// CSV header of the feature file
pub const CSV_HEADER: &str = "event_number,event_time,pp_height,p_ratio,p_dist,fwhm1,fwhm2";

/// Rows written between flushes of the feature file
const CSV_FLUSH_INTERVAL: u64 = 5;

/// Errors reported by sinks
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Receiver is gone")]
    Disconnected,
}

/// Consumer of acquisition events
pub trait EventSink<S: Sample> {
    /// Accept one event
    fn put(&mut self, event: &Event<S>) -> Result<(), SinkError>;

    /// Flush buffered output
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Create a single-slot mailbox
///
/// The sender never blocks: putting into a full mailbox replaces the
/// waiting item, so the receiver always sees the newest one.
///
/// # Example
/// ```
/// use scopedaq_core::sink::mailbox;
///
/// let (tx, rx) = mailbox();
/// tx.put(1).unwrap();
/// tx.put(2).unwrap();
/// assert_eq!(rx.try_recv(), Some(2));
/// assert_eq!(tx.replaced(), 1);
/// ```
pub fn mailbox<T>() -> (MailboxSender<T>, MailboxReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let receiver_alive = Arc::new(AtomicBool::new(true));
    let sender = MailboxSender {
        tx,
        drain: rx.clone(),
        replaced: Arc::new(AtomicU64::new(0)),
        receiver_alive: Arc::clone(&receiver_alive),
    };
    let receiver = MailboxReceiver { rx, receiver_alive };
    (sender, receiver)
}

/// Sending half of a [`mailbox`]
#[derive(Debug)]
pub struct MailboxSender<T> {
    tx: Sender<T>,
    /// Used to evict a waiting item when the slot is full
    drain: Receiver<T>,
    replaced: Arc<AtomicU64>,
    receiver_alive: Arc<AtomicBool>,
}

impl<T> MailboxSender<T> {
    /// Put `item`, replacing any item still waiting
    pub fn put(&self, mut item: T) -> Result<(), SinkError> {
        if !self.receiver_alive.load(Ordering::Acquire) {
            return Err(SinkError::Disconnected);
        }
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if self.drain.try_recv().is_ok() {
                        self.replaced.fetch_add(1, Ordering::Relaxed);
                    }
                    item = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return Err(SinkError::Disconnected),
            }
        }
    }

    /// Items dropped because a newer one replaced them
    pub fn replaced(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }
}

impl<S: Sample> EventSink<S> for MailboxSender<Event<S>> {
    fn put(&mut self, event: &Event<S>) -> Result<(), SinkError> {
        MailboxSender::put(self, event.clone())
    }
}

/// Receiving half of a [`mailbox`]
#[derive(Debug)]
pub struct MailboxReceiver<T> {
    rx: Receiver<T>,
    receiver_alive: Arc<AtomicBool>,
}

impl<T> MailboxReceiver<T> {
    /// Take the waiting item, if any
    pub fn try_recv(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for an item
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl<T> Drop for MailboxReceiver<T> {
    fn drop(&mut self) {
        self.receiver_alive.store(false, Ordering::Release);
    }
}

/// Writes one CSV row of pulse features per event
///
/// Events without features (no pulse filter, or free-running) are written
/// with a peak-to-peak height of -1 and sentinel widths.
pub struct CsvFeatureSink {
    writer: BufWriter<File>,
    started: DateTime<Utc>,
    rows: u64,
}

impl CsvFeatureSink {
    /// Create `path` and write the header; event times count from now
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{}", CSV_HEADER)?;
        tracing::info!(path = %path.display(), "Writing pulse features");
        Ok(Self {
            writer,
            started: Utc::now(),
            rows: 0,
        })
    }

    /// Rows written so far
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl<S: Sample> EventSink<S> for CsvFeatureSink {
    fn put(&mut self, event: &Event<S>) -> Result<(), SinkError> {
        let t = (event.time - self.started).num_microseconds().unwrap_or(0) as f64 / 1e6;
        match &event.features {
            Some(f) => writeln!(
                self.writer,
                "{},{:.6},{},{:.3},{},{},{}",
                event.sequence, t, f.pp_height, f.p_ratio, f.p_dist, f.fwhm1, f.fwhm2
            )?,
            None => writeln!(
                self.writer,
                "{},{:.6},-1,0.000,0,{},{}",
                event.sequence, t, FWHM_UNDETERMINED, FWHM_UNDETERMINED
            )?,
        }
        self.rows += 1;
        if self.rows % CSV_FLUSH_INTERVAL == 0 {
            self.writer.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for CsvFeatureSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Writes the first channel of each event as a JSON array, one per line
pub struct RawWaveformSink {
    writer: BufWriter<File>,
}

impl RawWaveformSink {
    /// Create `path`
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        tracing::info!(path = %path.display(), "Writing raw waveforms");
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl<S: Sample> EventSink<S> for RawWaveformSink {
    fn put(&mut self, event: &Event<S>) -> Result<(), SinkError> {
        let samples: Vec<i32> = event
            .data
            .channels()
            .first()
            .map(|c| c.iter().map(|s| s.to_i32()).collect())
            .unwrap_or_default();
        serde_json::to_writer(&mut self.writer, &samples)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for RawWaveformSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
