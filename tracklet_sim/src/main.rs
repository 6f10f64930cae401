//! Tracklet Simulator CLI
//!
//! Run reconstruction scenarios on deterministic synthetic events.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use tracklet_core::FinderConfig;
use tracklet_sim::scenarios::ScenarioId;
use tracklet_sim::{ScenarioResult, ScenarioRunner, SimConfig, SimExport};

/// Tracklet finder scenario CLI
#[derive(Parser, Debug)]
#[command(name = "tracklet-sim")]
#[command(about = "Run deterministic reconstruction scenarios for the tracklet finder", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (colinear_triplet, time_outlier, shared_hit, outside_active_area,
    /// rerun_determinism, multi_track, noisy_event, high_occupancy, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Events per randomized scenario
    #[arg(short, long, default_value = "20")]
    events: usize,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Finder configuration as JSON
    #[arg(short, long)]
    config: Option<String>,

    /// Detector and generator settings as JSON
    #[arg(long)]
    detector: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export searched events of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!("✓ {} (seed={}) PASSED", result.scenario, result.seed);
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario,
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    if !args.json {
        info!("Tracklet Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => {
                let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
                bail!("{} (available: {}, all)", e, names.join(", "));
            }
        }
    };

    let finder_config = match &args.config {
        Some(path) => FinderConfig::load(path)
            .with_context(|| format!("failed to load finder config {}", path))?,
        None => FinderConfig::default(),
    };
    let sim_config: SimConfig = match &args.detector {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read detector config {}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse detector config {}", path))?
        }
        None => SimConfig::default(),
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .context("system clock before epoch")?
            .as_nanos() as u64
    } else {
        args.seed
    };

    let runner_for = |seed: u64| {
        ScenarioRunner::new(seed)
            .with_events(args.events)
            .with_config(finder_config.clone())
            .with_sim_config(sim_config.clone())
    };

    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            bail!("--export only supports a single scenario, not 'all'");
        }

        let (result, records) = runner_for(base_seed).run_recorded(scenarios[0]);
        let export = SimExport::from_run(&result, &records);
        export
            .write_to_file(export_path)
            .with_context(|| format!("failed to write export {}", export_path))?;
        info!(
            "Exported {} events ({} tracks) to {}",
            export.events.len(),
            export.track_count(),
            export_path
        );
        report(&result);
        if !result.passed {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let runner = runner_for(base_seed.wrapping_add(seed_offset as u64));
        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result);
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario,
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    if failed_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}
