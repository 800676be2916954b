//! Simulation engine: exits, admission, sizing and accounting per bar.
//!
//! The engine consumes a validated [`BarSeries`](crate::domain::BarSeries)
//! and runs the three-phase bar loop:
//!
//! 1. Exits: stop-loss / take-profit evaluation over the open set
//! 2. Admission: capacity and risk gates, sizing, spread-adjusted entry
//! 3. Snapshot: mark-to-market and equity recording

pub mod accounting;
pub mod admission;
pub mod config;
pub mod error;
pub mod exit;
pub mod loop_runner;
pub mod risk;
pub mod state;

pub use accounting::Ledger;
pub use admission::{
    apply_spread, AdmissionController, RejectedSignal, RejectionCounters, RejectionReason,
};
pub use config::{
    AccountConfig, ConfigError, EngineConfig, ExecutionConfig, RiskLimits, SizerMode,
    SizingConfig,
};
pub use error::EngineError;
pub use exit::{evaluate_exit, evaluate_exits, ExitDecision, TieBreakPolicy};
pub use loop_runner::{run_backtest, Engine};
pub use risk::RiskState;
pub use state::{EngineState, RunResult};
