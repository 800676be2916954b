use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Account state at the close of one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub timestamp: NaiveDateTime,
    /// Realized balance.
    pub balance: f64,
    /// Mark-to-market P&L of all open positions at the bar close.
    pub unrealized_pnl: f64,
    /// `balance + unrealized_pnl`.
    pub equity: f64,
    pub open_positions: usize,
    /// Wins over closed trades so far, as a fraction. Zero before the first close.
    pub rolling_win_rate: f64,
}
