//! E2E tests for hysteresis-qualified triggering
//!
//! Checks the trigger ordering rule on many generated signals and the
//! single-spike behaviour through the full acquisition loop.

use scopedaq::audio::source::ReplaySource;
use scopedaq::{AcquisitionLoop, Edge, OsciConfig, TriggerDetector};

/// Small deterministic generator for test signals
struct TestRng(u32);

impl TestRng {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.0 >> 16
    }
}

/// Levels around and exactly on both boundaries
const LEVELS: [i16; 9] = [-2000, 0, 624, 625, 626, 4999, 5000, 5001, 9000];

fn random_signal(rng: &mut TestRng, len: usize) -> Vec<i16> {
    (0..len)
        .map(|_| LEVELS[rng.next() as usize % LEVELS.len()])
        .collect()
}

/// First threshold crossing that has a strict baseline sample before it
fn brute_force(signal: &[i16], threshold: i16, hysteresis: i16, edge: Edge) -> Option<usize> {
    let (baseline, past): (fn(i16, i16) -> bool, fn(i16, i16) -> bool) = match edge {
        Edge::Rising => (|v, h| v < h, |v, t| v > t),
        Edge::Falling => (|v, h| v > h, |v, t| v < t),
    };
    (0..signal.len()).find(|&j| {
        past(signal[j], threshold) && signal[..j].iter().any(|&v| baseline(v, hysteresis))
    })
}

/// Test the ordering rule on generated rising-edge signals
#[test]
fn test_hysteresis_ordering_rising() {
    let trigger = TriggerDetector::new(5000, 625, Edge::Rising);
    let mut rng = TestRng(7);

    for _ in 0..2000 {
        let signal = random_signal(&mut rng, 24);
        assert_eq!(
            trigger.scan(&signal),
            brute_force(&signal, 5000, 625, Edge::Rising),
            "signal {:?}",
            signal
        );
    }
}

/// Test the ordering rule on generated falling-edge signals
#[test]
fn test_hysteresis_ordering_falling() {
    let trigger = TriggerDetector::new(-5000, -625, Edge::Falling);
    let mut rng = TestRng(11);

    for _ in 0..2000 {
        let signal: Vec<i16> = random_signal(&mut rng, 24).iter().map(|v| -v).collect();
        assert_eq!(
            trigger.scan(&signal),
            brute_force(&signal, -5000, -625, Edge::Falling),
            "signal {:?}",
            signal
        );
    }
}

/// Test that a jump straight to threshold without a baseline sample is ignored
#[test]
fn test_no_trigger_without_prior_baseline() {
    let trigger = TriggerDetector::new(5000, 625, Edge::Rising);
    assert_eq!(trigger.scan(&[1000i16, 3000, 6000, 9000, 6000]), None);
    assert_eq!(trigger.scan(&[6000i16, 7000, 6000]), None);
    // a sample exactly on the hysteresis boundary is not baseline
    assert_eq!(trigger.scan(&[625i16, 6000]), None);
    assert_eq!(trigger.scan(&[624i16, 6000]), Some(1));
    // nor does exactly reaching the threshold fire
    assert_eq!(trigger.scan(&[0i16, 5000, 5000]), None);
}

/// Test a short spike: one trigger at its first sample above threshold
#[test]
fn test_spike_triggers_once() {
    let trigger = TriggerDetector::new(5000, 625, Edge::Rising);
    let mut signal = vec![0i16; 32];
    signal[10..14].fill(6000);

    assert_eq!(trigger.scan(&signal), Some(10));
    // the return to baseline re-arms but nothing crosses again
    assert_eq!(trigger.scan_from(&signal, 11), None);
}

/// Test the spike through the acquisition loop: exactly one event
#[test]
fn test_spike_through_acquisition_loop() {
    let frame_size = 32;
    let mut stream = vec![0i16; 5 * frame_size];
    // frame 1, offset 10
    stream[42..46].fill(6000);

    let config = OsciConfig {
        sampling_rate: 48000,
        number_of_samples: frame_size,
        trg_active: true,
        trg_threshold: 5000.0,
        trg_hysteresis: Some(625.0),
        window_length: 16,
        pre_trigger_fraction: 0.5,
        ..Default::default()
    };
    let source = ReplaySource::from_recording(vec![stream.clone()], frame_size, 48000);
    let mut acq = AcquisitionLoop::new(config, source).unwrap();

    let event = acq.next_event().unwrap().expect("one trigger");
    assert_eq!(event.sequence, 1);
    assert_eq!(event.stream_position, 42);
    assert_eq!(event.trigger_offset, Some(8));
    assert_eq!(event.data.channel(0), &stream[34..50]);

    assert!(acq.next_event().unwrap().is_none());
    assert_eq!(acq.sequence(), 1);
}

/// Stream positions of every event from a 32-sample-frame run of `stream`
fn trigger_positions(stream: Vec<i16>) -> Vec<u64> {
    let config = OsciConfig {
        sampling_rate: 48000,
        number_of_samples: 32,
        trg_active: true,
        trg_threshold: 5000.0,
        trg_hysteresis: Some(625.0),
        window_length: 16,
        pre_trigger_fraction: 0.5,
        ..Default::default()
    };
    let source = ReplaySource::from_recording(vec![stream], 32, 48000);
    let mut acq = AcquisitionLoop::new(config, source).unwrap();
    let mut positions = Vec::new();
    while let Some(event) = acq.next_event().unwrap() {
        positions.push(event.stream_position);
    }
    positions
}

/// Test spikes at and across slot boundaries trigger like any other
#[test]
fn test_spike_on_slot_boundary() {
    // inside a slot
    let mut stream = vec![0i16; 6 * 32];
    stream[70..74].fill(6000);
    assert_eq!(trigger_positions(stream), vec![70]);

    // first sample of a slot, baseline only in the slot before
    let mut stream = vec![0i16; 6 * 32];
    stream[64..68].fill(6000);
    assert_eq!(trigger_positions(stream), vec![64]);

    // rise starts in the slot before, crossing opens the next one
    let mut stream = vec![0i16; 6 * 32];
    stream[63] = 3000;
    stream[64..68].fill(6000);
    assert_eq!(trigger_positions(stream), vec![64]);

    // last sample of a slot
    let mut stream = vec![0i16; 6 * 32];
    stream[95..99].fill(6000);
    assert_eq!(trigger_positions(stream), vec![95]);
}

/// Test that a falling-edge spike triggers on its first sample below threshold
#[test]
fn test_falling_spike() {
    let trigger = TriggerDetector::new(-5000, -625, Edge::Falling);
    let mut signal = vec![0i16; 16];
    signal[5] = -3000;
    signal[6..9].fill(-6000);

    assert_eq!(trigger.scan(&signal), Some(6));
}
