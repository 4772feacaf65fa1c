//! LapView Replay CLI
//!
//! Replay a recorded or synthetic session headless and export what a viewer
//! would have shown.

use clap::Parser;
use lapview_core::{SeriesStore, SessionDocument, SpeedUnit};
use lapview_env::{SystemContext, VirtualContext};
use lapview_replay::{generate, ReplayConfig, ReplayError, ReplayExport, ReplayRunner, SyntheticConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// LapView headless replay CLI
#[derive(Parser, Debug)]
#[command(name = "lapview-replay")]
#[command(about = "Replay multi-car telemetry sessions headless", long_about = None)]
struct Args {
    /// Session document to replay (JSON)
    #[arg(short, long, conflicts_with = "synthetic")]
    data: Option<PathBuf>,

    /// Generate a seeded synthetic session instead of loading one
    #[arg(long)]
    synthetic: bool,

    /// Seed for --synthetic (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of cars for --synthetic
    #[arg(long, default_value = "4")]
    cars: usize,

    /// Laps per car for --synthetic
    #[arg(long, default_value = "3")]
    laps: u32,

    /// Replay configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Speed unit for readouts (mph, kmh)
    #[arg(short, long)]
    unit: Option<SpeedUnit>,

    /// Car followed by readouts and overlays
    #[arg(short, long)]
    entity: Option<usize>,

    /// Start playback at this time (seconds)
    #[arg(long)]
    start: Option<f64>,

    /// Play at wall-clock speed instead of virtual time
    #[arg(long)]
    realtime: bool,

    /// Export frames and overlays to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// JSON summary on stdout
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging (stderr, so --json output stays parseable)
    let level = if args.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("LapView Replay v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), ReplayError> {
    let config = build_config(args)?;
    let (label, seed, doc) = load_session(args)?;
    let store = Rc::new(SeriesStore::load(&doc)?);

    if let Some(entity) = config.selected_entity {
        if entity >= store.entity_count() {
            warn!("Session has no car {} ({} cars); readouts will be empty", entity, store.entity_count());
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let outcome = if args.realtime {
        runtime.block_on(ReplayRunner::new(SystemContext::shared(), config.clone()).run(store.clone()))
    } else {
        runtime.block_on(ReplayRunner::new(VirtualContext::shared(), config.clone()).run(store.clone()))
    };

    let stats = outcome.stats;
    let final_time = outcome.final_time;
    let summary = serde_json::json!({
        "source": label,
        "seed": seed,
        "cars": store.entity_count(),
        "events": store.events().len(),
        "max_time": outcome.max_time,
        "final_time": final_time,
        "reached_end": outcome.reached_end(),
        "refreshes": stats.refreshes,
        "frames_advanced": stats.frames_advanced,
        "frames_skipped": stats.frames_skipped,
        "overlay_refreshes": stats.overlay_refreshes,
        "frames_recorded": outcome.frames.len(),
    });

    if let Some(path) = &args.export {
        let export = ReplayExport::new(&label, seed, &store, config.unit, outcome);
        export.write_to_file(path)?;
        info!("Exported {} frames to {}", export.frames.len(), path.display());
    }

    if args.json {
        let text = serde_json::to_string_pretty(&summary).map_err(std::io::Error::from)?;
        println!("{}", text);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "✓ {} replayed to t={:.3}s | advanced={} skipped={} overlays={}",
            label, final_time, stats.frames_advanced, stats.frames_skipped, stats.overlay_refreshes
        );
    }

    Ok(())
}

/// Config file (if any) with CLI flags applied on top.
fn build_config(args: &Args) -> Result<ReplayConfig, ReplayError> {
    let mut config = match &args.config {
        Some(path) => ReplayConfig::from_file(path)?,
        None => ReplayConfig::default(),
    };
    if let Some(unit) = args.unit {
        config.unit = unit;
    }
    if let Some(entity) = args.entity {
        config.selected_entity = Some(entity);
    }
    if let Some(start) = args.start {
        config.start_time = start;
    }
    config.validate()?;
    Ok(config)
}

fn load_session(args: &Args) -> Result<(String, Option<u64>, SessionDocument), ReplayError> {
    if let Some(path) = &args.data {
        info!("Loading session from {}", path.display());
        let doc = SessionDocument::from_reader(BufReader::new(File::open(path)?))?;
        return Ok((path.display().to_string(), None, doc));
    }

    if args.synthetic {
        let seed = if args.seed == 0 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(42)
        } else {
            args.seed
        };
        info!("Generating synthetic session: seed={} cars={} laps={}", seed, args.cars, args.laps);
        let config = SyntheticConfig::default()
            .with_seed(seed)
            .with_cars(args.cars)
            .with_laps(args.laps);
        return Ok((format!("synthetic:{}", seed), Some(seed), generate(&config)?));
    }

    Err(ReplayError::config("either --data <file> or --synthetic is required"))
}
