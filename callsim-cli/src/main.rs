//! CallSim CLI — validate strategies, run single simulations, drive sweeps.
//!
//! Commands:
//! - `validate` — load a strategy definition and report schema/consistency errors
//! - `run` — one strategy against one candle file, event table to stdout
//! - `sweep` — batch run from a TOML config, JSON + CSV artifacts out

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};

use callsim_core::domain::SimulationResult;
use callsim_core::simulate;
use callsim_core::validate::load_strategy;
use callsim_runner::export::save_artifacts;
use callsim_runner::provider::{load_candles_csv, CsvProvider, SyntheticProvider};
use callsim_runner::sweep::run_sweep;
use callsim_runner::SweepConfig;

#[derive(Parser)]
#[command(
    name = "callsim",
    about = "Deterministic backtester for short-horizon trading calls"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a strategy definition file.
    Validate {
        /// Path to a strategy JSON file.
        strategy: PathBuf,
    },
    /// Run one strategy against one candle CSV.
    Run {
        /// Path to a strategy JSON file.
        #[arg(long)]
        strategy: PathBuf,

        /// Candle CSV (ts,open,high,low,close,volume with a header row).
        #[arg(long)]
        candles: PathBuf,

        /// Call reference time, epoch seconds. Defaults to the first candle.
        #[arg(long)]
        reference_ts: Option<i64>,

        /// Write the full result JSON here as well.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run a sweep from a TOML config file.
    Sweep {
        /// Path to a sweep TOML config.
        #[arg(long)]
        config: PathBuf,

        /// Directory holding candle CSV fixtures. Defaults to the config
        /// file's directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Output directory for sweep.json and summary.csv.
        #[arg(long, default_value = "results")]
        output: PathBuf,

        /// Force sequential execution.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Use deterministic synthetic candles instead of CSV fixtures.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Seed for synthetic candles.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { strategy } => cmd_validate(&strategy),
        Commands::Run {
            strategy,
            candles,
            reference_ts,
            output,
        } => cmd_run(&strategy, &candles, reference_ts, output.as_deref()),
        Commands::Sweep {
            config,
            data_dir,
            output,
            sequential,
            synthetic,
            seed,
        } => cmd_sweep(&config, data_dir, &output, sequential, synthetic, seed),
    }
}

fn read_strategy(path: &Path) -> Result<callsim_core::domain::StrategyDefinition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    load_strategy(&text).with_context(|| format!("invalid strategy '{}'", path.display()))
}

fn cmd_validate(path: &Path) -> Result<()> {
    let def = read_strategy(path)?;
    println!(
        "ok: '{}' (version {}, {} exit rule{})",
        def.name,
        def.version,
        def.exit.len(),
        if def.exit.len() == 1 { "" } else { "s" }
    );
    Ok(())
}

fn format_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn print_result(result: &SimulationResult) {
    println!(
        "{:<20} {:<13} {:>12} {:>10} {:>10} {:>12}  reason",
        "time", "event", "price", "fraction", "remaining", "pnl"
    );
    for event in &result.events {
        println!(
            "{:<20} {:<13} {:>12.6} {:>10.4} {:>10.4} {:>12.6}  {}",
            format_ts(event.ts),
            format!("{:?}", event.kind),
            event.price,
            event.fraction_of_original,
            event.remaining_fraction,
            event.realized_pnl_so_far,
            event.reason
        );
    }
    println!();
    println!("exit reason:       {:?}", result.exit_reason);
    println!("candles consumed:  {}", result.candles_consumed);
    println!("total fees paid:   {:.6}", result.total_fees_paid);
    println!("final PnL:         {:+.2}%", result.final_pnl_percent);
    println!("result hash:       {}", result.result_hash());
}

fn cmd_run(
    strategy_path: &Path,
    candles_path: &Path,
    reference_ts: Option<i64>,
    output: Option<&Path>,
) -> Result<()> {
    let def = read_strategy(strategy_path)?;
    let candles = load_candles_csv(candles_path)
        .with_context(|| format!("failed to load candles '{}'", candles_path.display()))?;
    if candles.is_empty() {
        bail!("candle file '{}' is empty", candles_path.display());
    }
    let reference_ts = reference_ts.unwrap_or(candles[0].ts);

    let result = simulate(&def, &candles, reference_ts)?;
    print_result(&result);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result).context("failed to serialize result")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn cmd_sweep(
    config_path: &Path,
    data_dir: Option<PathBuf>,
    output: &Path,
    sequential: bool,
    synthetic: bool,
    seed: u64,
) -> Result<()> {
    let config = SweepConfig::load(config_path)?;
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let strategies = config.load_strategies(&base_dir)?;
    let specs = config.expand(&strategies);
    let parallel = config.parallel && !sequential;

    let results = if synthetic {
        let provider = SyntheticProvider::new(seed);
        run_sweep(&specs, &provider, parallel)
    } else {
        let provider = CsvProvider::new(data_dir.unwrap_or(base_dir));
        run_sweep(&specs, &provider, parallel)
    };

    let written = save_artifacts(&results, output)?;
    println!(
        "{} runs: {} ok, {} failed",
        results.len(),
        results.successes().len(),
        results.failures().len()
    );
    for failure in results.failures() {
        if let Some((kind, message)) = failure.error() {
            eprintln!("  {} [{}]: {}", failure.call_id, kind, message);
        }
    }
    if let Some(best) = results.best() {
        if let Some(result) = best.result() {
            println!(
                "best: call {} / strategy {} at {:+.2}%",
                best.call_id, best.strategy_id, result.final_pnl_percent
            );
        }
    }
    for path in written {
        println!("wrote {}", path.display());
    }
    Ok(())
}
