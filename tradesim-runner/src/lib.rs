//! TradeSim Runner: backtest orchestration, metrics and artifacts.
//!
//! This crate builds on `tradesim-core` to provide:
//! - TOML configuration with a content-addressed run id
//! - CSV bar loading and a seeded synthetic bar generator
//! - Single-backtest runner with performance summary and output digest
//! - JSON / CSV / Markdown artifact export
//! - Parallel parameter sweeps over execution settings

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use config::{BacktestConfig, ConfigError, RunId, RunSection};
pub use data_loader::{
    dataset_hash, load_bars_csv, read_bars, synthetic_bars, write_bars_csv, LoadError,
    SyntheticOptions,
};
pub use export::{
    export_equity_csv, export_json, export_rejections_csv, export_sweep_csv, export_trades_csv,
    generate_report, import_json, load_artifacts, save_artifacts,
};
pub use metrics::{ExitReasonCounts, MonthlyBucket, PerformanceSummary};
pub use runner::{
    output_digest, run_from_config, run_with_config, BacktestResult, RunError, SCHEMA_VERSION,
};
pub use sweep::{run_sweep, SweepGrid, SweepOutcome, SweepPoint};
