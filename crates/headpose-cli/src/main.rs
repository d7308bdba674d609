//! `headpose` – run the head-pose estimator from the command line.
//!
//! Pose lines go to stdout, one per estimate; everything else (banner,
//! calibration notice, summary, logs) goes to stderr so the output can be
//! piped straight into another tool.
//!
//! - `headpose replay --input capture.jsonl [--rate-hz 120]`
//! - `headpose demo [--frames 500] [--rate-hz 100]`
//! - `headpose config [--init]`
//!
//! Ctrl-C closes ingestion, joins the worker and prints the summary.

mod config;
mod demo;
mod replay;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use colored::Colorize;
use headpose_middleware::bus::RecvError;
use headpose_middleware::{BufferStats, Ingestor, PointBuffer, PoseBus, Topic, TopicReceiver};
use headpose_runtime::{PoseWorker, WorkerStats, init_tracing};
use headpose_types::{EventPayload, PoseError, RawFrame};
use tracing::warn;

use crate::config::Config;
use crate::demo::HeadMotion;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Longest wait for the worker to pick up the final batch before shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "headpose")]
#[command(about = "Estimate rigid head pose from tracked marker clusters")]
#[command(version)]
struct Cli {
    /// Config file to use instead of ~/.headpose/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed recorded frames (one JSON object per line) through the estimator.
    Replay {
        /// Capture file in JSON-lines format.
        #[arg(long)]
        input: PathBuf,

        /// Submit at this rate instead of as fast as possible.
        #[arg(long)]
        rate_hz: Option<f64>,
    },

    /// Feed a synthetic moving head through the estimator.
    Demo {
        /// Number of frames to generate.
        #[arg(long, default_value_t = 500)]
        frames: usize,

        /// Capture rate to simulate.
        #[arg(long, default_value_t = 100.0)]
        rate_hz: f64,
    },

    /// Print the effective configuration.
    Config {
        /// Write it to the config file if none exists yet.
        #[arg(long)]
        init: bool,
    },
}

fn main() -> ExitCode {
    let _guard = init_tracing("headpose");
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(config::config_path);
    let cfg = match config::load_from(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Replay { input, rate_hz } => {
            print_banner();
            replay_file(&cfg, &input, rate_hz)
        }
        Commands::Demo { frames, rate_hz } => {
            print_banner();
            run_pipeline(
                &cfg,
                HeadMotion::new(rate_hz).take(frames).map(Ok),
                Some(rate_hz),
            )
        }
        Commands::Config { init } => show_config(&cfg, &path, init),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "Error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn replay_file(cfg: &Config, input: &Path, rate_hz: Option<f64>) -> CliResult<()> {
    let file =
        File::open(input).map_err(|e| format!("cannot open {}: {e}", input.display()))?;
    eprintln!("  Replaying {}", input.display().to_string().bold());
    run_pipeline(cfg, replay::frames(BufReader::new(file)), rate_hz)
}

fn show_config(cfg: &Config, path: &Path, init: bool) -> CliResult<()> {
    if init {
        if path.exists() {
            eprintln!("  {} already exists; left untouched", path.display());
        } else {
            config::save_to(cfg, path)?;
            eprintln!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
        }
    }
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct FeedStats {
    accepted: u64,
    rejected: u64,
    unreadable: u64,
}

fn run_pipeline<I>(cfg: &Config, frames: I, rate_hz: Option<f64>) -> CliResult<()>
where
    I: Iterator<Item = Result<RawFrame, String>>,
{
    let buffer = Arc::new(PointBuffer::new());
    let ingestor = Ingestor::new(Arc::clone(&buffer), cfg.marker_selection()?);

    // The worker gets the only bus handle, so both readers finish once it
    // has been joined.
    let bus = PoseBus::new(cfg.bus_capacity);
    let printer = spawn_pose_printer(bus.subscribe_to(Topic::Pose));
    let diagnostics = spawn_diagnostics(bus.subscribe_to(Topic::Diagnostics));
    let worker = PoseWorker::spawn(cfg.estimator_config(), ingestor.clone(), bus)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    let stopper = worker.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received, stopping …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
        stopper.stop();
    }) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }

    let period = rate_hz
        .filter(|hz| hz.is_finite() && *hz > 0.0)
        .map(|hz| Duration::from_secs_f64(1.0 / hz));
    let mut feed = FeedStats::default();

    for frame in frames {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "skipping unreadable frame");
                feed.unreadable += 1;
                continue;
            }
        };
        match ingestor.submit_frame(&frame) {
            Ok(_) => feed.accepted += 1,
            Err(PoseError::IngestionClosed) => break,
            Err(_) => feed.rejected += 1,
        }
        if let Some(period) = period {
            thread::sleep(period);
        }
    }

    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while buffer.is_dirty() && worker.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }

    let stats = worker.shutdown()?;
    let printed = printer.join().unwrap_or(0);
    let _ = diagnostics.join();

    print_summary(
        &feed,
        &buffer.stats(),
        &stats,
        printed,
        interrupted.load(Ordering::SeqCst),
    );
    Ok(())
}

fn spawn_pose_printer(mut poses: TopicReceiver) -> JoinHandle<u64> {
    thread::spawn(move || {
        let mut printed = 0;
        loop {
            match poses.blocking_recv() {
                Ok(event) => {
                    if let EventPayload::Pose(pose) = event.payload {
                        println!("{pose}");
                        printed += 1;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "pose printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
        printed
    })
}

fn spawn_diagnostics(mut events: TopicReceiver) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            match events.blocking_recv() {
                Ok(event) => {
                    if let EventPayload::Calibrated { sequence, centroid } = event.payload {
                        eprintln!(
                            "  {} Calibrated on frame {sequence} at ({:.3}, {:.3}, {:.3})",
                            "✓".green().bold(),
                            centroid.x,
                            centroid.y,
                            centroid.z
                        );
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    eprintln!();
    eprintln!(
        "  {} {}",
        "headpose".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    eprintln!("  Rigid head-pose estimation from marker clusters");
    eprintln!();
}

fn print_summary(
    feed: &FeedStats,
    buffer: &BufferStats,
    worker: &WorkerStats,
    printed: u64,
    interrupted: bool,
) {
    eprintln!();
    if interrupted {
        eprintln!("  {}", "Interrupted.".yellow());
    }
    eprintln!("  {}", "Summary".bold());
    eprintln!("    frames accepted   {}", feed.accepted);
    if feed.rejected > 0 || feed.unreadable > 0 {
        eprintln!(
            "    frames rejected   {}",
            (feed.rejected + feed.unreadable).to_string().red()
        );
    }
    eprintln!("    overwritten       {}", buffer.coalesced);
    eprintln!("    processed         {}", worker.processed);
    eprintln!("    poses emitted     {}", worker.emitted);
    eprintln!("    poses printed     {printed}");
    if worker.skipped > 0 {
        eprintln!("    cycles skipped    {}", worker.skipped.to_string().yellow());
    }
    if !worker.calibrated {
        eprintln!("  {}", "No calibration pose was captured.".yellow());
    }
}
