//! TradeSim CLI: run, sweep and data generation commands.
//!
//! Commands:
//! - `run`: execute a backtest from a TOML config file and save artifacts
//! - `sweep`: run a grid of execution settings in parallel
//! - `generate`: write a synthetic annotated bar file as CSV

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tradesim_core::domain::BarSeries;
use tradesim_core::engine::TieBreakPolicy;
use tradesim_runner::{
    export_json, export_sweep_csv, load_bars_csv, run_from_config, run_sweep, save_artifacts,
    synthetic_bars, write_bars_csv, BacktestConfig, BacktestResult, SweepGrid, SyntheticOptions,
};

#[derive(Parser)]
#[command(name = "tradesim", about = "TradeSim CLI: bar-by-bar trade execution simulator")]
struct Cli {
    /// Log filter used when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest and save its artifacts.
    Run {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bar CSV file. Overrides `run.bars` from the config.
        #[arg(long)]
        bars: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the full result as JSON instead of the summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run every combination of max positions, spread and tie-break policy.
    Sweep {
        /// Path to a TOML config file used as the base of every point.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bar CSV file. Overrides `run.bars` from the config.
        #[arg(long)]
        bars: Option<PathBuf>,

        /// Comma-separated max_positions values (e.g. 1,3,5).
        #[arg(long, value_delimiter = ',')]
        max_positions: Vec<usize>,

        /// Comma-separated spreads (e.g. 0,0.002,0.005).
        #[arg(long, value_delimiter = ',')]
        spreads: Vec<f64>,

        /// Comma-separated tie-break policies: stop_loss_first, take_profit_first, ohlc_path.
        #[arg(long, value_delimiter = ',', value_parser = parse_tie_break)]
        tie_breaks: Vec<TieBreakPolicy>,

        /// Write the sweep table as CSV here instead of printing it.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write a synthetic random-walk bar file with signal annotations.
    Generate {
        /// Destination CSV path.
        #[arg(long)]
        output: PathBuf,

        /// Number of bars.
        #[arg(long, default_value_t = 1_000)]
        bars: usize,

        /// RNG seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// First bar date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// Minutes between bars.
        #[arg(long, default_value_t = 60)]
        interval_minutes: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Run {
            config,
            bars,
            output_dir,
            json,
        } => run_backtest_cmd(config, bars, output_dir, json),
        Commands::Sweep {
            config,
            bars,
            max_positions,
            spreads,
            tie_breaks,
            output,
        } => run_sweep_cmd(
            config,
            bars,
            SweepGrid {
                max_positions,
                spreads,
                tie_breaks,
            },
            output,
        ),
        Commands::Generate {
            output,
            bars,
            seed,
            start,
            interval_minutes,
        } => run_generate(output, bars, seed, start, interval_minutes),
    }
}

/// Install a fmt subscriber on stderr. `RUST_LOG` wins over `--log-level`.
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<BacktestConfig> {
    match path {
        Some(path) => BacktestConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(BacktestConfig::default()),
    }
}

fn run_backtest_cmd(
    config_path: Option<PathBuf>,
    bars: Option<PathBuf>,
    output_dir: PathBuf,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    if bars.is_none() && config.run.bars.is_none() {
        bail!("no bar file: pass --bars or set run.bars in the config");
    }

    let result = run_from_config(&config, bars.as_deref(), None)?;

    if json {
        println!("{}", export_json(&result)?);
    } else {
        print_summary(&result);
    }

    // Save full artifact set (manifest.json, trades.csv, equity.csv, ...)
    let run_dir = save_artifacts(&result, &output_dir)?;
    info!(dir = %run_dir.display(), "artifacts saved");
    if !json {
        println!("Artifacts saved to: {}", run_dir.display());
    }

    Ok(())
}

fn run_sweep_cmd(
    config_path: Option<PathBuf>,
    bars: Option<PathBuf>,
    grid: SweepGrid,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let Some(bars_path) = bars.or_else(|| config.run.bars.clone()) else {
        bail!("no bar file: pass --bars or set run.bars in the config");
    };
    let series: BarSeries = load_bars_csv(&bars_path)?;

    let outcomes = run_sweep(&grid, &config, &series, None)?;
    let table = export_sweep_csv(&outcomes)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &table)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{} sweep points written to {}", outcomes.len(), path.display());
        }
        None => print!("{table}"),
    }
    Ok(())
}

fn run_generate(
    output: PathBuf,
    bars: usize,
    seed: u64,
    start: Option<String>,
    interval_minutes: i64,
) -> Result<()> {
    if bars == 0 {
        bail!("--bars must be at least 1");
    }
    if interval_minutes <= 0 {
        bail!("--interval-minutes must be positive");
    }

    let mut opts = SyntheticOptions {
        bars,
        seed,
        step: chrono::Duration::minutes(interval_minutes),
        ..SyntheticOptions::default()
    };
    if let Some(start) = start {
        let date = NaiveDate::parse_from_str(&start, "%Y-%m-%d")
            .with_context(|| format!("invalid --start '{start}' (expected YYYY-MM-DD)"))?;
        opts.start = date.and_hms_opt(0, 0, 0).context("invalid start time")?;
    }

    let generated = synthetic_bars(&opts);
    write_bars_csv(&generated, &output)?;
    let signals = generated.iter().filter(|b| !b.signal.is_flat()).count();
    println!(
        "Wrote {} bars ({} signals) to {}",
        generated.len(),
        signals,
        output.display()
    );
    Ok(())
}

fn parse_tie_break(value: &str) -> Result<TieBreakPolicy, String> {
    TieBreakPolicy::ALL
        .into_iter()
        .find(|policy| policy.to_string() == value)
        .ok_or_else(|| {
            format!("unknown tie-break '{value}'. Valid: stop_loss_first, take_profit_first, ohlc_path")
        })
}

fn print_summary(result: &BacktestResult) {
    let s = &result.summary;
    println!();
    println!("=== Backtest Result ===");
    println!("Name:           {}", result.name);
    println!("Run ID:         {}", tradesim_runner::runner::short_id(&result.run_id));
    println!(
        "Bars:           {} ({} void)",
        result.bar_count, result.void_bars
    );
    println!("Sizer:          {}", result.sizer);
    println!(
        "Signals:        {} seen, {} opened, {} rejected",
        result.signals_seen,
        result.positions_opened,
        s.rejections.total()
    );
    println!("Trades:         {}", s.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Final Balance:  {:.2}", s.final_balance);
    println!("Net Profit:     {:.2}", s.net_profit);
    println!("Total Return:   {:.2}%", s.total_return * 100.0);
    println!("Max Drawdown:   {:.2}%", s.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", s.win_rate * 100.0);
    println!(
        "Profit Factor:  {}",
        tradesim_runner::export::format_profit_factor(s.profit_factor)
    );
    println!("Max Consec Win: {}", s.max_consecutive_wins);
    println!("Max Consec Loss:{}", s.max_consecutive_losses);
    println!(
        "Exits:          {} TP / {} SL / {} manual",
        s.exit_reasons.take_profit, s.exit_reasons.stop_loss, s.exit_reasons.manual
    );
    if result.cancelled {
        println!();
        println!("WARNING: run was cancelled before the end of the bar stream");
    }
    println!("Digest:         {}", result.output_digest);
}
