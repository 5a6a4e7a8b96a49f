//! Trigger scanning and window extraction benchmarks
//!
//! Run with:
//!   cargo bench --bench trigger_scan
//!
//! One frame must be scanned well within its own duration
//! (1024 samples at 48 kHz is 21 ms).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scopedaq::audio::ring::RingCapture;
use scopedaq::audio::signal::{PulseGenerator, PulseShape};
use scopedaq::audio::window::WindowExtractor;
use scopedaq::{Edge, Frame, PulseAnalyzer, TriggerDetector};

fn pulse_train(len: usize, interval: usize) -> Vec<i16> {
    let mut generator = PulseGenerator::new(PulseShape::bipolar(10000.0, 0.5), interval)
        .with_offset(interval / 2)
        .with_noise(300.0, 7);
    let mut samples = vec![0i16; len];
    generator.fill(&mut samples);
    samples
}

/// Scan one frame: quiet, and with one pulse near its end
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("trigger_scan");
    let trigger = TriggerDetector::new(5000, 625, Edge::Rising);

    for frame_size in [256, 1024, 4096] {
        group.throughput(Throughput::Elements(frame_size as u64));

        let quiet = pulse_train(frame_size, frame_size * 4);
        let mut late_pulse = vec![0i16; frame_size];
        let pulse = PulseShape::bipolar(10000.0, 0.5).samples::<i16>();
        let start = frame_size - pulse.len();
        late_pulse[start..].copy_from_slice(&pulse);

        group.bench_with_input(BenchmarkId::new("quiet", frame_size), &quiet, |b, frame| {
            b.iter(|| black_box(trigger.scan(black_box(frame.as_slice()))))
        });
        group.bench_with_input(
            BenchmarkId::new("late_pulse", frame_size),
            &late_pulse,
            |b, frame| b.iter(|| black_box(trigger.scan(black_box(frame.as_slice())))),
        );
    }

    group.finish();
}

/// Copy windows out of a 3-slot ring, with and without wrapping
fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_extract");
    let frame_size = 1024;
    let mut ring = RingCapture::new(2, frame_size, 3);
    let train = pulse_train(3 * frame_size, 500);
    for chunk in train.chunks(frame_size) {
        ring.write(&Frame::from_channels(vec![chunk.to_vec(), chunk.to_vec()]));
    }

    for length in [100, 512, 1024] {
        let extractor = WindowExtractor::new(length, 0.37);
        group.throughput(Throughput::Elements(length as u64));
        group.bench_with_input(BenchmarkId::new("middle", length), &extractor, |b, ex| {
            b.iter(|| black_box(ex.extract(&ring, black_box(frame_size + 500))))
        });
        group.bench_with_input(BenchmarkId::new("wrapped", length), &extractor, |b, ex| {
            b.iter(|| black_box(ex.extract(&ring, black_box(10))))
        });
    }

    group.finish();
}

/// Analyze one accepted pulse window
fn bench_analyze(c: &mut Criterion) {
    let analyzer = PulseAnalyzer::new(0.25, 10);
    let mut window = vec![0i16; 35];
    window.extend(PulseShape::bipolar(10000.0, 0.5).samples::<i16>());
    window.resize(100, 0);

    c.bench_function("pulse_analyze", |b| {
        b.iter(|| black_box(analyzer.analyze(black_box(window.as_slice()), 37, false)))
    });
}

criterion_group!(benches, bench_scan, bench_extract, bench_analyze);
criterion_main!(benches);
