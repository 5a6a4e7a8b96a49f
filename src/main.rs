//! ScopeDAQ - sound-card gamma-detector front end
//!
//! Reads waveforms from the sound card, triggers on detector pulses,
//! filters them by bipolar shape and optionally stores pulse features and
//! raw waveforms.

use anyhow::{Context, Result};
use scopedaq::audio::acquisition::AcquisitionLoop;
use scopedaq::audio::signal::{PulseGenerator, PulseShape};
use scopedaq::audio::soundcard::{self, SoundCardSource};
use scopedaq::audio::source::{FrameSource, SimulatedSource};
use scopedaq::sink::{mailbox, CsvFeatureSink, EventSink, RawWaveformSink};
use scopedaq::{CancelToken, Event, OsciConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Command line options on top of the configuration
struct Options {
    config: OsciConfig,
    file_base: Option<String>,
    write_raw: bool,
    run_seconds: u64,
    simulate: bool,
    quiet: bool,
}

/// Error counters shared between the acquisition thread and the summary
#[derive(Default)]
struct Progress {
    /// Failed sink writes, one per failure
    sink_errors: AtomicU64,
    /// Transient read errors as counted by the loop statistics
    read_errors: AtomicU64,
}

impl Progress {
    fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// The loop's running total, never lowered
    fn record_read_errors(&self, total: u64) {
        self.read_errors.fetch_max(total, Ordering::Relaxed);
    }

    fn sink_errors(&self) -> u64 {
        self.sink_errors.load(Ordering::Relaxed)
    }

    fn read_errors(&self) -> u64 {
        self.read_errors.load(Ordering::Relaxed)
    }

    fn total_errors(&self) -> u64 {
        self.sink_errors() + self.read_errors()
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scopedaq=info".parse()?)
                .add_directive("scopedaq_core=info".parse()?),
        )
        .init();

    let Some(options) = parse_args()? else {
        return Ok(());
    };

    if !options.quiet {
        println!(
            "ScopeDAQ v{} ({}) - sound card gamma detector",
            scopedaq::VERSION,
            scopedaq::BUILD_DATE
        );
        println!();
    }

    run(options)
}

fn parse_args() -> Result<Option<Options>> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut overrides: Vec<(String, String)> = Vec::new();
    let mut options = Options {
        config: OsciConfig::default(),
        file_base: None,
        write_raw: false,
        run_seconds: 3600,
        simulate: false,
        quiet: false,
    };

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        let takes_value = matches!(
            arg,
            "-s" | "--samplingrate"
                | "-z"
                | "--samplesize"
                | "-c"
                | "--channels"
                | "-l"
                | "--trglevel"
                | "--overshoot"
                | "-r"
                | "--range"
                | "-f"
                | "--file"
                | "-t"
                | "--time"
                | "--device"
                | "--config"
        );
        if takes_value {
            let Some(value) = args.get(i + 1) else {
                eprintln!("Error: {} requires a value", arg);
                return Ok(None);
            };
            match arg {
                "-f" | "--file" => options.file_base = Some(value.clone()),
                "-t" | "--time" => {
                    options.run_seconds = value
                        .parse()
                        .with_context(|| format!("Invalid run time: {}", value))?
                }
                "--config" => config_path = Some(PathBuf::from(value)),
                _ => overrides.push((arg.to_string(), value.clone())),
            }
            i += 2;
            continue;
        }

        match arg {
            "--list" => {
                list_devices();
                return Ok(None);
            }
            "--version" | "-v" => {
                println!("scopedaq {}", scopedaq::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--trgfalling" => overrides.push((arg.to_string(), String::new())),
            "-d" | "--trgdeactivate" => overrides.push((arg.to_string(), String::new())),
            "--nofilter" => overrides.push((arg.to_string(), String::new())),
            "-w" | "--write_raw" => options.write_raw = true,
            "--simulate" => options.simulate = true,
            "-q" | "--quiet" => options.quiet = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                return Ok(None);
            }
        }
        i += 1;
    }

    // gamma-detector defaults, then the config file, then flags
    let mut config = match config_path {
        Some(path) => OsciConfig::load(&path),
        None => OsciConfig {
            trg_active: true,
            trg_threshold: 5000.0,
            pulse_filter: true,
            range: (1 << 14) as f64,
            ..OsciConfig::default()
        },
    };
    for (flag, value) in overrides {
        apply_flag(&mut config, &flag, &value)?;
    }
    if config.trg_falling && config.trg_threshold > 0.0 {
        config.trg_threshold = -config.trg_threshold;
    }
    options.config = config;
    Ok(Some(options))
}

fn apply_flag(config: &mut OsciConfig, flag: &str, value: &str) -> Result<()> {
    match flag {
        "-s" | "--samplingrate" => {
            config.sampling_rate = value
                .parse()
                .with_context(|| format!("Invalid sampling rate: {}", value))?
        }
        "-z" | "--samplesize" => {
            config.number_of_samples = value
                .parse()
                .with_context(|| format!("Invalid sample size: {}", value))?
        }
        "-c" | "--channels" => {
            let count: u16 = value
                .parse()
                .with_context(|| format!("Invalid channel count: {}", value))?;
            config.channels = (1..=count).collect();
        }
        "-l" | "--trglevel" => {
            config.trg_threshold = value
                .parse()
                .with_context(|| format!("Invalid trigger level: {}", value))?
        }
        "--overshoot" => {
            config.overshoot_fraction = value
                .parse()
                .with_context(|| format!("Invalid overshoot fraction: {}", value))?
        }
        "-r" | "--range" => {
            config.range = value
                .parse()
                .with_context(|| format!("Invalid range: {}", value))?
        }
        "--device" => config.device = Some(value.to_string()),
        "--trgfalling" => config.trg_falling = true,
        "-d" | "--trgdeactivate" => config.trg_active = false,
        "--nofilter" => config.pulse_filter = false,
        _ => {}
    }
    Ok(())
}

fn print_help() {
    println!("Usage: scopedaq [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -s, --samplingrate RATE  Sampling rate in Hz (default: 44100)");
    println!("  -z, --samplesize N       Samples per read (default: 1024)");
    println!("  -c, --channels N         Number of channels (default: 1)");
    println!("  -l, --trglevel LEVEL     Trigger level in ADC counts (default: 5000)");
    println!("      --trgfalling         Trigger on falling edge");
    println!("  -d, --trgdeactivate      Free-running, no trigger");
    println!("      --overshoot FRAC     Minimum overshoot fraction (default: 0.25)");
    println!("      --nofilter           Keep pulses of any shape");
    println!("  -r, --range RANGE        Display range (default: 16384)");
    println!("  -f, --file BASE          Base file name for pulse features (CSV)");
    println!("  -w, --write_raw          Also write raw waveforms (JSON lines)");
    println!("  -t, --time SECONDS       Run time (default: 3600)");
    println!("      --device NAME        Input device (default: system default)");
    println!("      --config PATH        Load settings from a JSON config file");
    println!("      --simulate           Use a simulated pulse source");
    println!("      --list               List input devices");
    println!("  -q, --quiet              No status output");
    println!("  -v, --version            Show version");
    println!("  -h, --help               Show this help");
}

fn list_devices() {
    match soundcard::list_devices() {
        Ok(devices) if devices.is_empty() => println!("No input devices found."),
        Ok(devices) => {
            println!("Found {} input device(s):", devices.len());
            println!();
            for (i, device) in devices.iter().enumerate() {
                let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                println!("  {}. {}{}", i + 1, device.name, default_marker);
                println!("     Channels: {} in", device.input_channels);
                if !device.sample_rates.is_empty() {
                    println!("     Sample rates: {:?}", device.sample_rates);
                }
            }
        }
        Err(e) => {
            error!("Failed to list devices: {}", e);
            println!("Error: {}", e);
        }
    }
}

fn run(options: Options) -> Result<()> {
    options.config.validate()?;

    let stamp = chrono::Local::now().format("%y%m%d-%H%M").to_string();
    let mut sinks: Vec<Box<dyn EventSink<i16> + Send>> = Vec::new();
    if let Some(base) = &options.file_base {
        let path = PathBuf::from(format!("{}_{}.csv", base, stamp));
        sinks.push(Box::new(CsvFeatureSink::create(&path)?));
    }
    if options.write_raw {
        let base = options.file_base.as_deref().unwrap_or("scopedaq");
        let path = PathBuf::from(format!("{}_raw_{}.jsonl", base, stamp));
        sinks.push(Box::new(RawWaveformSink::create(&path)?));
    }
    // newest event for the status line
    let (latest_tx, latest_rx) = mailbox::<Event<i16>>();
    sinks.push(Box::new(latest_tx));

    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || handler_cancel.cancel()).ok();

    let progress = Arc::new(Progress::default());
    let worker = {
        let config = options.config.clone();
        let cancel = cancel.clone();
        let progress = Arc::clone(&progress);
        let simulate = options.simulate;
        thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || -> Result<()> {
                // the cpal stream has to live on the thread that reads it
                if simulate {
                    let source = simulated_source(&config);
                    acquire(config, source, cancel, sinks, &progress)
                } else {
                    let source = SoundCardSource::<i16>::open(&config)?;
                    acquire(config, source, cancel, sinks, &progress)
                }
            })?
    };

    if !options.quiet {
        println!(" --> start reading from sound card ... Ctrl+C to stop");
    }
    let t_start = Instant::now();
    let mut t_last = t_start;
    let mut n_last = 0;
    let mut count = 0;
    while !cancel.is_cancelled() && !worker.is_finished() {
        thread::sleep(Duration::from_millis(100));
        if t_last.elapsed() < Duration::from_secs(1) {
            continue;
        }
        let runtime = t_start.elapsed().as_secs_f64();
        if let Some(event) = latest_rx.try_recv() {
            count = event.sequence;
        }
        let rate = (count - n_last) as f64 / t_last.elapsed().as_secs_f64();
        t_last = Instant::now();
        n_last = count;
        if !options.quiet {
            print!(
                "\ractive: {:.1} s  triggers: {}  rate: {:.1} Hz   ",
                runtime, count, rate
            );
            use std::io::Write;
            std::io::stdout().flush().ok();
        }
        if runtime >= options.run_seconds as f64 {
            info!(runtime, "Run time ended");
            break;
        }
    }
    cancel.cancel();

    let result = worker
        .join()
        .map_err(|_| anyhow::anyhow!("acquisition thread panicked"))?;
    if !options.quiet {
        println!();
        println!("               ... stop reading data");
    }
    let errors = progress.total_errors();
    if errors != 0 {
        println!(
            "!!! {} errors in event loop ({} read, {} sink) !!!",
            errors,
            progress.read_errors(),
            progress.sink_errors()
        );
    }
    result
}

fn simulated_source(config: &OsciConfig) -> SimulatedSource {
    let amplitude = 2.0 * config.trg_threshold.abs().max(1.0) as f32;
    let amplitude = if config.trg_falling { -amplitude } else { amplitude };
    let shapes = vec![
        PulseShape::bipolar(amplitude, 0.5),
        PulseShape::bipolar(amplitude, 0.4),
        PulseShape::bipolar(amplitude, 0.1),
    ];
    let interval = (config.sampling_rate / 20).max(64) as usize;
    let generator = PulseGenerator::with_shapes(shapes, interval)
        .with_offset(interval / 3)
        .with_noise(amplitude.abs() / 100.0, 0x5eed);
    SimulatedSource::new(
        generator,
        config.channels.len(),
        config.number_of_samples,
        config.sampling_rate,
    )
    .paced(true)
}

fn acquire<F: FrameSource<i16>>(
    config: OsciConfig,
    source: F,
    cancel: CancelToken,
    mut sinks: Vec<Box<dyn EventSink<i16> + Send>>,
    progress: &Progress,
) -> Result<()> {
    let mut acq = AcquisitionLoop::new(config, source)?.with_cancel_token(cancel);
    let mut t_rate = Instant::now();
    let mut n_rate = 0;

    while let Some(event) = acq.next_event()? {
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.put(&event) {
                warn!(error = %e, "Sink write failed");
                progress.record_sink_error();
            }
        }

        let elapsed = t_rate.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            let rate = (event.sequence - n_rate) as f64 / elapsed;
            acq.stats_mut().record_rate(rate);
            n_rate = event.sequence;
            t_rate = Instant::now();
        }
        progress.record_read_errors(acq.stats().stats().transient_errors);
    }

    for sink in sinks.iter_mut() {
        sink.flush()?;
    }
    let stats = acq.stats().stats();
    info!(
        events = stats.events,
        rejected = stats.rejections.total(),
        errors = stats.transient_errors,
        overruns = stats.overruns,
        avg_height = stats.avg_pulse_height,
        "Acquisition summary"
    );
    progress.record_read_errors(stats.transient_errors);
    Ok(())
}
