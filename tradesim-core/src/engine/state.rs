//! Mutable engine state and run result types.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::ids::IdGen;
use crate::domain::{EquitySnapshot, Position, TradeRecord};
use crate::engine::admission::{RejectedSignal, RejectionCounters};
use crate::engine::risk::RiskState;

/// Mutable state that evolves bar-by-bar during the engine loop.
#[derive(Debug)]
pub struct EngineState {
    /// Open positions in insertion order.
    pub open: Vec<Position>,
    pub id_gen: IdGen,
    pub risk: RiskState,
    /// Bars processed so far; also the index of the next bar.
    pub bar_index: usize,
    pub last_timestamp: Option<NaiveDateTime>,
    /// Latest manual close; later bars may not precede it.
    pub last_manual_close: Option<NaiveDateTime>,
    /// Last valid close price (for void bar equity carry-forward).
    pub last_valid_close: Option<f64>,
    pub void_bars: usize,
    /// Bars on which the open set was at capacity after exits.
    pub capacity_saturated_bars: usize,
    pub positions_opened: u64,
}

impl EngineState {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            open: Vec::new(),
            id_gen: IdGen::default(),
            risk: RiskState::new(initial_balance),
            bar_index: 0,
            last_timestamp: None,
            last_manual_close: None,
            last_valid_close: None,
            void_bars: 0,
            capacity_saturated_bars: 0,
            positions_opened: 0,
        }
    }
}

/// Result of a completed engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquitySnapshot>,
    pub rejections: RejectionCounters,
    pub rejected_signals: Vec<RejectedSignal>,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub commission_paid: f64,
    pub peak_equity: f64,
    pub bars_processed: usize,
    pub void_bars: usize,
    /// Non-flat signals seen, admitted or not.
    pub signals_seen: u64,
    pub positions_opened: u64,
    pub capacity_saturated_bars: usize,
    /// True if the run was stopped early by a cancellation request.
    pub cancelled: bool,
    pub sizer: String,
}

impl RunResult {
    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map_or(self.final_balance, |s| s.equity)
    }
}
