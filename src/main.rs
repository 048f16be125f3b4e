//! Companion Sense CLI
//!
//! Runs the sensing pipeline against a synthetic source and manages the
//! stored calibration, zone layout and session history.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use companion_sense::{
    config::Config,
    core::{CalibrationPlane, GameStatus},
    source::synthetic::{demo_zones, DEMO_CORNERS},
    store::{ConfigStore, JsonFileStore, Snapshot, ZoneRecord},
    Pipeline, PipelineCounters, SessionHistory, SyntheticConfig, SyntheticSource, VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "companion-sense")]
#[command(version = VERSION)]
#[command(about = "Heart-rate, floor-zone and adaptive play sensing core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline against the synthetic landmark source
    Run {
        /// Stop after this many seconds (runs until Ctrl+C otherwise)
        #[arg(long)]
        duration: Option<u64>,

        /// Seed for the synthetic source
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Simulated pulse in beats per minute
        #[arg(long, default_value = "72")]
        pulse_bpm: f64,
    },

    /// Store four floor corners (camera-normalized x,y pairs in calibration order)
    Calibrate {
        /// Eight numbers: x0 y0 x1 y1 x2 y2 x3 y3
        #[arg(num_args = 8, allow_negative_numbers = true, conflicts_with = "demo")]
        points: Vec<f64>,

        /// Use the corners matching the synthetic walk
        #[arg(long)]
        demo: bool,
    },

    /// List the stored zone layout
    Zones {
        /// Replace the stored layout with the demo start pad and three targets
        #[arg(long)]
        demo: bool,
    },

    /// Show calibration state and cumulative pipeline counters
    Status,

    /// Show finished play sessions
    History {
        /// Number of sessions to show
        #[arg(long, short, default_value = "10")]
        limit: usize,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            duration,
            seed,
            pulse_bpm,
        } => cmd_run(duration, seed, pulse_bpm),
        Commands::Calibrate { points, demo } => cmd_calibrate(&points, demo),
        Commands::Zones { demo } => cmd_zones(demo),
        Commands::Status => cmd_status(),
        Commands::History { limit } => cmd_history(limit),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config() -> Result<Config> {
    let config = Config::load().unwrap_or_default();
    config
        .ensure_directories()
        .context("Failed to create data directory")?;
    Ok(config)
}

fn load_snapshot(store: &JsonFileStore) -> Result<Snapshot> {
    Ok(store
        .load()
        .with_context(|| format!("Failed to read snapshot at {:?}", store.path()))?
        .unwrap_or_default())
}

fn cmd_run(duration: Option<u64>, seed: u64, pulse_bpm: f64) -> Result<()> {
    let config = load_config()?;
    config.validate().context("Invalid configuration")?;

    let counters = Arc::new(PipelineCounters::with_persistence(config.counters_path()));
    let mut history = SessionHistory::with_persistence(config.history_path());
    let store = JsonFileStore::new(config.snapshot_path());

    let mut pipeline = Pipeline::new(config.clone(), Arc::clone(&counters))
        .context("Failed to build pipeline")?;

    let loaded = pipeline
        .load_from(&store)
        .context("Stored snapshot could not be applied")?;
    if !loaded {
        info!("No stored calibration, using the demo floor layout");
        for (index, [x, y]) in DEMO_CORNERS.iter().enumerate() {
            pipeline.set_calibration_point(index, *x, *y)?;
        }
        pipeline.compute_homography()?;
        pipeline
            .configure_zones(demo_zones(config.calibration.canonical_size))
            .context("Demo zones were rejected")?;
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running))?;

    let source = SyntheticSource::new(SyntheticConfig {
        pulse_hz: pulse_bpm / 60.0,
        seed,
        ..SyntheticConfig::default()
    });
    pipeline.start(source).context("Failed to start pipeline")?;
    pipeline.set_ready()?;

    println!("Companion Sense v{VERSION}");
    println!("Pipeline running at {:.0} Hz. Press Ctrl+C to stop.", config.pipeline.tick_rate_hz);
    println!();

    let started = Instant::now();
    let deadline = duration.map(Duration::from_secs);
    let mut last_print = Instant::now();

    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        thread::sleep(Duration::from_millis(100));

        for summary in pipeline.take_finished_sessions() {
            println!(
                "Round finished: score {} ({} hits, {} misses, {:.0}% accuracy)",
                summary.score,
                summary.hits,
                summary.misses,
                summary.accuracy * 100.0
            );
            if let Err(e) = history.append(summary) {
                warn!("Failed to save session history: {e}");
            }
        }

        if last_print.elapsed() >= Duration::from_secs(1) {
            last_print = Instant::now();
            let status = pipeline.status();
            let target = status
                .game
                .active_target
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "[{}] bpm={} score={} timer={}s target={} difficulty={}",
                status.game.status,
                status.bpm,
                status.game.score,
                status.game.timer,
                target,
                status.game.difficulty
            );
        }
    }

    println!();
    println!("Shutting down...");

    if pipeline.get_game_state().status != GameStatus::Sleep {
        pipeline.stop_game();
    }
    for summary in pipeline.take_finished_sessions() {
        if let Err(e) = history.append(summary) {
            warn!("Failed to save session history: {e}");
        }
    }

    pipeline.save_to(&store).context("Failed to save snapshot")?;
    pipeline.dispose().context("Pipeline did not stop cleanly")?;

    println!();
    println!("{}", counters.summary());
    Ok(())
}

fn cmd_calibrate(points: &[f64], demo: bool) -> Result<()> {
    let config = load_config()?;
    let corners: Vec<[f64; 2]> = if demo {
        DEMO_CORNERS.to_vec()
    } else {
        if points.len() != 8 {
            bail!("Expected eight coordinates (four x,y corners), got {}", points.len());
        }
        points.chunks(2).map(|c| [c[0], c[1]]).collect()
    };

    let mut plane = CalibrationPlane::new(config.calibration.canonical_size);
    for (index, [x, y]) in corners.iter().enumerate() {
        plane.set_point(index, *x, *y)?;
    }
    plane
        .compute_homography()
        .context("Corners do not form a usable floor quadrilateral")?;

    let store = JsonFileStore::new(config.snapshot_path());
    let mut snapshot = load_snapshot(&store)?;
    snapshot.calibration = plane.snapshot();
    store.save(&snapshot).context("Failed to save snapshot")?;

    println!("Calibration saved to {:?}", store.path());
    for (index, [x, y]) in corners.iter().enumerate() {
        println!("  corner {index}: ({x:.3}, {y:.3})");
    }
    Ok(())
}

fn cmd_zones(demo: bool) -> Result<()> {
    let config = load_config()?;
    let store = JsonFileStore::new(config.snapshot_path());
    let mut snapshot = load_snapshot(&store)?;

    if demo {
        snapshot.zones = demo_zones(config.calibration.canonical_size)
            .iter()
            .enumerate()
            .map(|(priority, zone)| ZoneRecord::from_zone(zone, priority))
            .collect();
        store.save(&snapshot).context("Failed to save snapshot")?;
        println!("Demo layout saved to {:?}", store.path());
        println!();
    }

    let zones = snapshot.to_zones().context("Stored zone layout is invalid")?;
    if zones.is_empty() {
        println!("No zones configured. Use 'companion-sense zones --demo' to load a layout.");
        return Ok(());
    }

    let start = config.game.start_zone_id;
    println!("Zones (priority order):");
    for zone in &zones {
        let role = if zone.id == start {
            "start"
        } else if config.game.target_zone_ids.contains(&zone.id) {
            "target"
        } else {
            "-"
        };
        println!("  {:>3}  {:<10} {:<7} {}", zone.id, zone.name, role, describe_shape(zone));
    }

    let unplaced: Vec<_> = config
        .game_zone_ids()
        .into_iter()
        .filter(|id| !zones.iter().any(|zone| zone.id == *id))
        .collect();
    if !unplaced.is_empty() {
        println!();
        println!("Warning: game zones {unplaced:?} have no entry in the layout");
    }
    Ok(())
}

fn describe_shape(zone: &companion_sense::Zone) -> String {
    match &zone.shape {
        companion_sense::core::Shape::Polygon { vertices } => {
            format!("polygon, {} vertices", vertices.len())
        }
        companion_sense::core::Shape::Circle { center, radius } => {
            format!("circle at ({:.0}, {:.0}) r={:.0}", center.x, center.y, radius)
        }
    }
}

fn cmd_status() -> Result<()> {
    let config = load_config()?;

    println!("Companion Sense Status");
    println!("======================");
    println!();

    let store = JsonFileStore::new(config.snapshot_path());
    let snapshot = load_snapshot(&store)?;
    println!(
        "Calibration: {}",
        match snapshot.to_plane() {
            Ok(Some(_)) => "calibrated".to_string(),
            Ok(None) => "not calibrated".to_string(),
            Err(e) => format!("invalid ({e})"),
        }
    );
    println!("Zones: {}", snapshot.zones.len());
    println!();

    match PipelineCounters::read_persisted(&config.counters_path()) {
        Ok(Some(stats)) => {
            println!("Cumulative Statistics (last saved {}):", stats.last_updated.format("%Y-%m-%d %H:%M:%S"));
            println!("  Samples accepted: {}", stats.samples_accepted);
            println!("  Samples rejected: {}", stats.samples_rejected);
            println!("  Points detected: {}", stats.points_detected);
            println!("  Points missing: {}", stats.points_missing);
            println!("  Frames dropped: {}", stats.frames_dropped);
            println!("  Estimates: {}", stats.estimates);
            println!("  Signal failures: {}", stats.signal_failures);
            println!("  Budget overruns: {}", stats.budget_overruns);
            println!("  Activations: {}", stats.activations);
        }
        Ok(None) => println!("No previous session data found."),
        Err(e) => warn!("Could not read counters: {e}"),
    }
    Ok(())
}

fn cmd_history(limit: usize) -> Result<()> {
    let config = load_config()?;
    let history = SessionHistory::with_persistence(config.history_path());

    if history.is_empty() {
        println!("No sessions recorded yet.");
        println!("Run 'companion-sense run' to play a round.");
        return Ok(());
    }

    println!("Last {} of {} session(s):", history.recent(limit).len(), history.len());
    for session in history.recent(limit) {
        println!(
            "  {}  score {:>4}  hits {:>3}  misses {:>3}  {:>5.1}s  {:<6} bpm {}{}",
            session.started_at.format("%Y-%m-%d %H:%M:%S"),
            session.score,
            session.hits,
            session.misses,
            session.duration_secs,
            session.difficulty,
            session.last_bpm,
            if session.completed { "" } else { "  (stopped)" }
        );
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?
    );
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
