use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use audioviz_shm::inspect::Inspector;
use audioviz_shm::Transport::Frame::Header::{
    DEFAULT_COUNTER_NAME, DEFAULT_MAX_BINS, DEFAULT_SEGMENT_NAME, DEFAULT_SLOT_COUNT,
    DEFAULT_SLOT_SIZE,
};
use audioviz_shm::{unlink_resources, ReadOutcome, TransportBuilder, WriteOutcome};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Shared-memory spectral frame transport tools", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct ResourceArgs {
    /// Shared memory segment name.
    #[arg(long, default_value = DEFAULT_SEGMENT_NAME)]
    segment: String,
    /// Flow-control counter (semaphore) name.
    #[arg(long, default_value = DEFAULT_COUNTER_NAME)]
    counter: String,
}

#[derive(Args, Debug, Clone)]
struct GeometryArgs {
    #[arg(long, default_value_t = DEFAULT_SLOT_COUNT)]
    slots: usize,
    #[arg(long, default_value_t = DEFAULT_SLOT_SIZE)]
    slot_size: usize,
    #[arg(long, default_value_t = DEFAULT_MAX_BINS)]
    max_bins: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Remove the segment and counter left behind by a producer.
    Cleanup {
        #[command(flatten)]
        resources: ResourceArgs,
    },
    /// Dump the header of every slot.
    Inspect {
        #[command(flatten)]
        resources: ResourceArgs,
        #[command(flatten)]
        geometry: GeometryArgs,
        /// Keep refreshing until interrupted.
        #[arg(long)]
        continuous: bool,
        /// Refresh interval in seconds.
        #[arg(long, default_value_t = 1.0)]
        interval: f64,
    },
    /// Stream a synthetic spectrum at audio pace.
    Produce {
        #[command(flatten)]
        resources: ResourceArgs,
        #[command(flatten)]
        geometry: GeometryArgs,
        /// Stop after this many frames (0 = until interrupted).
        #[arg(long, default_value_t = 0)]
        frames: u64,
        /// Bins per frame.
        #[arg(long, default_value_t = 512)]
        bins: usize,
        /// Sample rate written into each header.
        #[arg(long, default_value_t = 44_100)]
        rate: u32,
        /// Samples between frames; sets the pacing.
        #[arg(long, default_value_t = 512)]
        hop: u32,
        /// Also write phase bins.
        #[arg(long)]
        phase: bool,
        /// Leave the segment and counter in place on exit.
        #[arg(long)]
        keep: bool,
    },
    /// Read frames in order and print a line per frame.
    Consume {
        #[command(flatten)]
        resources: ResourceArgs,
        #[command(flatten)]
        geometry: GeometryArgs,
        /// Stop after this many frames (0 = until interrupted).
        #[arg(long, default_value_t = 0)]
        frames: u64,
        /// Wait per read.
        #[arg(long, default_value_t = 100)]
        timeout_ms: u64,
        /// Expect phase bins after the magnitudes.
        #[arg(long)]
        phase: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Cleanup { resources } => run_cleanup(&resources),
        Commands::Inspect {
            resources,
            geometry,
            continuous,
            interval,
        } => run_inspect(&resources, &geometry, continuous, interval),
        Commands::Produce {
            resources,
            geometry,
            frames,
            bins,
            rate,
            hop,
            phase,
            keep,
        } => run_produce(&resources, &geometry, frames, bins, rate, hop, phase, keep),
        Commands::Consume {
            resources,
            geometry,
            frames,
            timeout_ms,
            phase,
        } => run_consume(&resources, &geometry, frames, timeout_ms, phase),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .try_init();
}

fn builder(resources: &ResourceArgs, geometry: &GeometryArgs) -> TransportBuilder {
    TransportBuilder::new()
        .with_segment_name(resources.segment.clone())
        .with_counter_name(resources.counter.clone())
        .with_slot_count(geometry.slots)
        .with_slot_size(geometry.slot_size)
        .with_max_bins(geometry.max_bins)
}

/// Flag flipped by Ctrl-C so loops can finish cleanly.
fn stop_flag() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)) {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }
    running
}

fn run_cleanup(resources: &ResourceArgs) -> audioviz_shm::Result<()> {
    tracing::info!(segment = %resources.segment, counter = %resources.counter, "cleaning up IPC resources");
    let report = unlink_resources(&resources.segment, &resources.counter)?;
    println!(
        "segment {}: {}",
        resources.segment,
        if report.segment_removed { "removed" } else { "not present" }
    );
    println!(
        "counter {}: {}",
        resources.counter,
        if report.counter_removed { "removed" } else { "not present" }
    );
    Ok(())
}

fn run_inspect(
    resources: &ResourceArgs,
    geometry: &GeometryArgs,
    continuous: bool,
    interval: f64,
) -> audioviz_shm::Result<()> {
    let inspector: Inspector = builder(resources, geometry).build_inspector()?;
    let running = continuous.then(stop_flag);
    let interval = Duration::try_from_secs_f64(interval.max(0.05)).unwrap_or(Duration::from_secs(1));

    loop {
        println!("{}", "=".repeat(80));
        print!("{}", inspector.snapshot()?);
        match &running {
            Some(flag) if flag.load(Ordering::SeqCst) => std::thread::sleep(interval),
            _ => return Ok(()),
        }
    }
}

/// Moving-peak spectrum standing in for a real analysis stage.
fn synthetic_spectrum(frame: u64, bins: usize, out: &mut Vec<f32>) {
    out.clear();
    if bins == 0 {
        return;
    }
    let peak = (frame as usize * 3) % bins;
    out.extend((0..bins).map(|i| {
        let d = i.abs_diff(peak) as f32;
        1.0 / (1.0 + d * d * 0.05)
    }));
}

#[allow(clippy::too_many_arguments)]
fn run_produce(
    resources: &ResourceArgs,
    geometry: &GeometryArgs,
    frames: u64,
    bins: usize,
    rate: u32,
    hop: u32,
    with_phase: bool,
    keep: bool,
) -> audioviz_shm::Result<()> {
    let mut transport = builder(resources, geometry).build_producer()?;
    let running = stop_flag();

    let frame_period = Duration::from_secs_f64(hop.max(1) as f64 / rate.max(1) as f64);
    let mut magnitude = Vec::with_capacity(bins);
    let phase_bins: Vec<f32> = (0..bins).map(|i| (i as f32 * 0.1).sin()).collect();

    tracing::info!(bins, rate, hop, "streaming synthetic frames");
    let start = Instant::now();
    let mut attempted = 0u64;
    while running.load(Ordering::SeqCst) && (frames == 0 || attempted < frames) {
        synthetic_spectrum(attempted, bins, &mut magnitude);
        let phase = with_phase.then_some(phase_bins.as_slice());
        match transport.write_frame(&magnitude, rate, phase) {
            Ok(WriteOutcome::Written { .. }) => {}
            Ok(WriteOutcome::Dropped) => tracing::trace!(frame = attempted, "dropped"),
            Err(e) if !e.is_fatal() => tracing::warn!(error = %e, "frame rejected"),
            Err(e) => return Err(e),
        }
        attempted += 1;

        let due = frame_period.mul_f64(attempted as f64);
        if let Some(sleep) = due.checked_sub(start.elapsed()) {
            std::thread::sleep(sleep);
        }
    }

    let stats = transport.stats();
    let elapsed = start.elapsed().as_secs_f64();
    println!("Processing complete:");
    println!("  Frames sent: {}", stats.written);
    println!("  Frames dropped: {}", stats.dropped);
    println!("  Frames truncated: {}", stats.truncated);
    println!("  Duration: {elapsed:.2} seconds");
    if elapsed > 0.0 {
        println!("  Average FPS: {:.1}", stats.written as f64 / elapsed);
    }

    if keep {
        transport.close();
    } else {
        transport.cleanup()?;
    }
    Ok(())
}

fn run_consume(
    resources: &ResourceArgs,
    geometry: &GeometryArgs,
    frames: u64,
    timeout_ms: u64,
    with_phase: bool,
) -> audioviz_shm::Result<()> {
    let mut reader = builder(resources, geometry).build_reader(with_phase)?;
    let running = stop_flag();
    let timeout = Duration::from_millis(timeout_ms.max(1));

    println!("\n{:<10} {:<8} {:<10} {}", "Frame", "Bins", "Rate", "Peak bin");
    println!("{}", "=".repeat(48));

    while running.load(Ordering::SeqCst) && (frames == 0 || reader.frames_read() < frames) {
        match reader.read_next(Some(timeout))? {
            ReadOutcome::Frame(frame) => {
                let peak = frame
                    .magnitude
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, _)| i);
                println!(
                    "{:<10} {:<8} {:<10} {}",
                    frame.header.sequence,
                    frame.header.bin_count,
                    frame.header.sample_rate,
                    peak.map_or("-".to_string(), |p| p.to_string())
                );
            }
            ReadOutcome::Empty => {}
            ReadOutcome::Invalid { slot, reason } => {
                println!("slot {slot}: invalid ({reason})");
            }
        }
    }

    println!(
        "\nread {} frame(s), skipped {}, invalid {}",
        reader.frames_read(),
        reader.frames_skipped(),
        reader.frames_invalid()
    );
    Ok(())
}
