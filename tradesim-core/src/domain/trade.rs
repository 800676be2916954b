//! TradeRecord: one closed position, flattened for the ledger.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::ids::PositionId;
use super::position::{Direction, ExitReason};

/// A complete round-trip trade: entry → exit.
///
/// Flat by construction so that the ledger serializes as one row per trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub position_id: PositionId,
    pub strategy_label: String,
    pub direction: Direction,

    // ── Entry ──
    pub opened_at: NaiveDateTime,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub size: f64,

    // ── Exit ──
    pub closed_at: NaiveDateTime,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── PnL ──
    pub profit_in_price_units: f64,
    pub profit_in_pips: f64,
    pub profit_in_account_currency: f64,
    pub commission: f64,
    pub net_profit: f64,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.net_profit > 0.0
    }

    /// Calendar month of the exit, formatted `YYYY-MM`.
    pub fn exit_month(&self) -> String {
        self.closed_at.format("%Y-%m").to_string()
    }
}
