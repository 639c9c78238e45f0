//! Gauge CLI - calibrate a cheap story evaluator against a reference oracle
//!
//! Usage:
//!   gauge init                          Create .gauge/ with config and seed patterns
//!   gauge run --artifacts <file>        Iterate until converged, plateaued or stopped
//!   gauge iterate --artifacts <file>    Run a single iteration
//!   gauge status                        Show convergence and calibration status
//!   gauge metrics                       Compare the latest iteration to the baseline
//!   gauge patterns list                 List learned patterns
//!   gauge calibration reset             Reopen the oracle calibration window

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gauge_core::{GaugeConfig, IterationMetrics, PatternStatus, StopSignal};
use gauge_evolution::{builtin_patterns, PatternStore};
use gauge_metrics::IterationHistory;
use gauge_oracle::{AnthropicOracle, OracleConfig};
use gauge_orchestrator::{
    CalibrationController, CalibrationLoop, JsonArtifactSource, LoopStatus, State,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "gauge")]
#[command(author, version, about = "Dual-mode evaluation and pattern calibration")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// State directory
    #[arg(long, global = true, default_value = gauge_core::config::STATE_DIR)]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the state directory with a default config
    Init {
        /// Do not install the built-in seed patterns
        #[arg(long)]
        no_seed: bool,
    },

    /// Run the calibration loop until a terminal state
    Run {
        /// JSON array of artifacts to score each iteration
        #[arg(short, long, value_name = "FILE")]
        artifacts: PathBuf,
    },

    /// Run a single iteration
    Iterate {
        /// JSON array of artifacts to score
        #[arg(short, long, value_name = "FILE")]
        artifacts: PathBuf,
    },

    /// Show convergence and calibration status
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show baseline and latest iteration metrics
    Metrics {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pattern management
    Patterns {
        #[command(subcommand)]
        action: PatternCommands,
    },

    /// Oracle calibration
    Calibration {
        #[command(subcommand)]
        action: CalibrationCommands,
    },
}

#[derive(Subcommand)]
enum PatternCommands {
    /// List patterns (active and provisional unless --all)
    List {
        /// Include rejected and pruned patterns
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum CalibrationCommands {
    /// Forget the calibration decision and start a new window
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let state_dir = cli.state_dir;
    match cli.command {
        Commands::Init { no_seed } => cmd_init(&state_dir, no_seed).await,
        Commands::Run { artifacts } => cmd_run(&state_dir, artifacts).await,
        Commands::Iterate { artifacts } => cmd_iterate(&state_dir, artifacts).await,
        Commands::Status { json } => cmd_status(&state_dir, json).await,
        Commands::Metrics { json } => cmd_metrics(&state_dir, json).await,
        Commands::Patterns { action } => cmd_patterns(&state_dir, action).await,
        Commands::Calibration { action } => cmd_calibration(&state_dir, action).await,
    }
}

fn load_config(state_dir: &Path) -> Result<GaugeConfig> {
    GaugeConfig::load_or_default(state_dir)
        .with_context(|| format!("Failed to load config from {:?}", state_dir))
}

async fn open_loop(state_dir: &Path, artifacts: PathBuf) -> Result<CalibrationLoop> {
    let config = load_config(state_dir)?;
    let oracle = AnthropicOracle::from_settings(&config.oracle)
        .context("Failed to set up the reference oracle")?;
    let source = JsonArtifactSource::new(artifacts);
    let engine = CalibrationLoop::open(config, Arc::new(source), Arc::new(oracle))
        .await
        .context("Failed to open the calibration loop")?;
    Ok(engine)
}

/// Raise the stop signal on Ctrl-C; the in-flight oracle call still finishes
fn install_stop_handler(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested; finishing the current oracle call");
            stop.stop();
        }
    });
}

async fn cmd_init(state_dir: &Path, no_seed: bool) -> Result<()> {
    info!("Initializing Gauge in {:?}", state_dir);

    let config_path = state_dir.join("config.toml");
    if config_path.exists() {
        println!("Config already exists at {:?}", config_path);
    } else {
        GaugeConfig::write_default(state_dir).context("Failed to write default config")?;
        println!("Wrote {:?}", config_path);
    }

    if !no_seed {
        let config = load_config(state_dir)?;
        let store = PatternStore::new(config.storage.patterns_path());
        let seeded = store
            .seed_if_empty(builtin_patterns())
            .await
            .context("Failed to seed the pattern store")?;
        if seeded > 0 {
            println!("Installed {} seed patterns", seeded);
        } else {
            println!("Pattern store already populated; seeds skipped");
        }
    }

    println!("\nNext: gauge run --artifacts <file.json>");
    Ok(())
}

async fn cmd_run(state_dir: &Path, artifacts: PathBuf) -> Result<()> {
    let mut engine = open_loop(state_dir, artifacts).await?;
    install_stop_handler(engine.stop_handle());

    let summary = engine.run().await.context("Calibration loop failed")?;

    println!("Calibration Run");
    println!("===============");
    println!("Iterations completed: {}", summary.iterations.len());
    println!("Final state: {}", summary.final_state.name());
    if let State::Failed { error } = &summary.final_state {
        println!("Error: {}", error);
    }
    Ok(())
}

async fn cmd_iterate(state_dir: &Path, artifacts: PathBuf) -> Result<()> {
    let mut engine = open_loop(state_dir, artifacts).await?;
    install_stop_handler(engine.stop_handle());

    let Some(log) = engine.run_iteration().await.context("Iteration failed")? else {
        println!("Iteration limit already reached; nothing to do");
        return Ok(());
    };

    println!(
        "Iteration {}{}",
        log.iteration,
        if log.complete { "" } else { " (interrupted)" }
    );
    print_metrics("  ", &log.metrics);
    println!("  Mutations: {}", log.mutations.len());
    if let Some(check) = &log.convergence {
        println!("  Convergence: {} ({})", check.outcome, check.reason);
    }
    if let Some(decision) = &log.calibration {
        println!("  Calibration: adopted {}", decision.adopted_config);
    }
    Ok(())
}

async fn cmd_status(state_dir: &Path, json: bool) -> Result<()> {
    let config = load_config(state_dir)?;
    let status = LoopStatus::collect(&config)
        .await
        .context("Failed to read loop status")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Gauge Status");
    println!("============");
    match status.last_iteration {
        Some(iteration) => println!(
            "Last iteration: {}{}",
            iteration,
            if status.last_complete == Some(false) {
                " (interrupted)"
            } else {
                ""
            }
        ),
        None => println!("Last iteration: none"),
    }
    println!("Next iteration: {}", status.next_iteration);
    if let Some(check) = &status.convergence {
        println!("Convergence: {} ({})", check.outcome, check.reason);
    }

    match &status.calibration {
        Some(decision) => println!(
            "Oracle: {} (calibrated at iteration {}, overlap {:.0}%)",
            decision.adopted_config,
            decision.decided_iteration,
            decision.overlap_rate * 100.0
        ),
        None => println!("Oracle: {} (calibrating)", status.standing_oracle),
    }

    let counts = &status.pattern_counts;
    println!(
        "Patterns: {} active, {} provisional, {} rejected, {} pruned",
        counts.active, counts.provisional, counts.rejected, counts.pruned
    );
    Ok(())
}

async fn cmd_metrics(state_dir: &Path, json: bool) -> Result<()> {
    let config = load_config(state_dir)?;
    let history = IterationHistory::new(
        config.storage.history_path(),
        config.storage.history_limit,
    );
    let summary = history
        .summary()
        .await
        .context("Failed to read iteration history")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let (Some(baseline), Some(latest)) = (&summary.baseline, &summary.latest) else {
        println!("No completed iterations yet");
        return Ok(());
    };

    println!("Baseline (iteration {}):", baseline.iteration);
    print_metrics("  ", baseline);
    println!("Latest (iteration {}):", latest.iteration);
    print_metrics("  ", latest);
    if let Some(reduction) = summary.gap_reduction {
        println!("Gap reduction: {:+.2}", reduction);
    }
    println!("Retained logs: {}", summary.retained);
    Ok(())
}

async fn cmd_patterns(state_dir: &Path, action: PatternCommands) -> Result<()> {
    let config = load_config(state_dir)?;
    let store = PatternStore::new(config.storage.patterns_path());

    match action {
        PatternCommands::List { all } => {
            let patterns = store.load().await.context("Failed to load patterns")?;
            let shown: Vec<_> = patterns
                .iter()
                .filter(|p| all || p.status.participates())
                .collect();

            if shown.is_empty() {
                println!("No patterns found");
                return Ok(());
            }

            println!("Patterns:");
            for p in shown {
                println!("  {} [{}] {} - {}", p.id, p.status, p.polarity, p.description);
                println!(
                    "    Keywords: {}",
                    p.keywords.iter().cloned().collect::<Vec<_>>().join(", ")
                );
                println!(
                    "    Weight: {:.2}  Accuracy: {:.0}%  Fired: {}",
                    p.weight,
                    p.accuracy * 100.0,
                    p.fire_count
                );
                if p.status == PatternStatus::Provisional {
                    println!("    Discovered in iteration {}", p.discovered_iteration);
                }
            }
        }
    }

    Ok(())
}

async fn cmd_calibration(state_dir: &Path, action: CalibrationCommands) -> Result<()> {
    let config = load_config(state_dir)?;

    match action {
        CalibrationCommands::Reset => {
            let mut controller = CalibrationController::load(
                config.calibration.clone(),
                config.storage.calibration_path(),
                OracleConfig::primary(&config.oracle)?,
                OracleConfig::secondary(&config.oracle)?,
            )
            .await
            .context("Failed to load calibration state")?;
            controller.reset().await?;
            println!(
                "Calibration reset; the next {} iterations judge with both {} and {}",
                config.calibration.window,
                controller.primary().name,
                controller.secondary().name
            );
        }
    }

    Ok(())
}

fn print_metrics(indent: &str, m: &IterationMetrics) {
    println!(
        "{}Expensive: {:.2}  Cheap: {:.2}  Gap: {:+.2}  |Gap|: {:.2}",
        indent, m.mean_expensive, m.mean_cheap, m.mean_gap, m.mean_abs_gap
    );
    println!("{}Scored: {}  Sentinels: {}", indent, m.scored, m.sentinels);
}
