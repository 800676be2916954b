//! Backtest runner: wires together config, bar loading, engine and metrics.
//!
//! Two entry points:
//! - `run_from_config()`: loads bars from the config's `run.bars` file (or an
//!   override path), then runs. Used by the CLI.
//! - `run_with_config()`: takes a pre-loaded `BarSeries`. Used by sweeps,
//!   which share one series across many engines.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use tradesim_core::domain::{BarSeries, EquitySnapshot, TradeRecord};
use tradesim_core::engine::{run_backtest, EngineConfig, EngineError, RejectedSignal};

use crate::config::{BacktestConfig, ConfigError, RunId};
use crate::data_loader::{dataset_hash, load_bars_csv, LoadError};
use crate::export::{export_equity_csv, export_trades_csv};
use crate::metrics::PerformanceSummary;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("no bar file: set run.bars in the config or pass one explicitly")]
    NoBarSource,
    #[error("failed to render ledger for digest: {0}")]
    Digest(String),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub name: String,
    pub config: EngineConfig,
    pub dataset_hash: String,
    pub sizer: String,
    pub bar_count: usize,
    pub void_bars: usize,
    pub signals_seen: u64,
    pub positions_opened: u64,
    pub capacity_saturated_bars: usize,
    pub cancelled: bool,
    pub summary: PerformanceSummary,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquitySnapshot>,
    pub rejected_signals: Vec<RejectedSignal>,
    /// BLAKE3 over the trades CSV followed by the equity CSV.
    pub output_digest: String,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run a backtest, loading bars from `bars_override` or the config's `run.bars`.
pub fn run_from_config(
    config: &BacktestConfig,
    bars_override: Option<&Path>,
    cancel: Option<&AtomicBool>,
) -> Result<BacktestResult, RunError> {
    let path = bars_override
        .or(config.run.bars.as_deref())
        .ok_or(RunError::NoBarSource)?;
    let series = load_bars_csv(path)?;
    run_with_config(config, &series, cancel)
}

/// Run a backtest over pre-loaded bars. No I/O.
pub fn run_with_config(
    config: &BacktestConfig,
    series: &BarSeries,
    cancel: Option<&AtomicBool>,
) -> Result<BacktestResult, RunError> {
    let run_id = config.run_id()?;
    info!(name = %config.run.name, run_id = %short_id(&run_id), "running backtest");

    let run = run_backtest(series, &config.engine, cancel)?;
    let summary = PerformanceSummary::compute(&run);
    let output_digest = output_digest(&run.trades, &run.equity_curve)?;

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        name: config.run.name.clone(),
        config: config.engine.clone(),
        dataset_hash: dataset_hash(series),
        sizer: run.sizer,
        bar_count: run.bars_processed,
        void_bars: run.void_bars,
        signals_seen: run.signals_seen,
        positions_opened: run.positions_opened,
        capacity_saturated_bars: run.capacity_saturated_bars,
        cancelled: run.cancelled,
        summary,
        trades: run.trades,
        equity_curve: run.equity_curve,
        rejected_signals: run.rejected_signals,
        output_digest,
    })
}

/// Digest of the rendered ledger and equity curve.
///
/// Two runs with the same digest produced byte-identical CSV artifacts.
pub fn output_digest(
    trades: &[TradeRecord],
    equity_curve: &[EquitySnapshot],
) -> Result<String, RunError> {
    let trades_csv = export_trades_csv(trades).map_err(|e| RunError::Digest(format!("{e:#}")))?;
    let equity_csv =
        export_equity_csv(equity_curve).map_err(|e| RunError::Digest(format!("{e:#}")))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(trades_csv.as_bytes());
    hasher.update(equity_csv.as_bytes());
    Ok(hasher.finalize().to_hex().to_string())
}

/// First 12 hex characters, for log lines and directory names.
pub fn short_id(run_id: &str) -> &str {
    run_id.get(..12).unwrap_or(run_id)
}
