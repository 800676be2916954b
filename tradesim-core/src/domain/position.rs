//! Position: one simulated trade and its lifecycle.
//!
//! ```text
//! Open ──► ClosedTakeProfit
//!      ├─► ClosedStopLoss
//!      └─► ClosedManual
//! ```
//!
//! A position is created `Open` by admission control and mutated exactly once,
//! by [`Position::close`]. Closing twice is an error.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::ids::PositionId;
use super::pnl::{settle, Pricing};
use super::trade::TradeRecord;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, −1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "Long"),
            Direction::Short => write!(f, "Short"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "TakeProfit"),
            ExitReason::StopLoss => write!(f, "StopLoss"),
            ExitReason::Manual => write!(f, "Manual"),
        }
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    ClosedTakeProfit,
    ClosedStopLoss,
    ClosedManual,
}

impl PositionStatus {
    pub fn is_open(self) -> bool {
        self == PositionStatus::Open
    }
}

impl From<ExitReason> for PositionStatus {
    fn from(reason: ExitReason) -> Self {
        match reason {
            ExitReason::TakeProfit => PositionStatus::ClosedTakeProfit,
            ExitReason::StopLoss => PositionStatus::ClosedStopLoss,
            ExitReason::Manual => PositionStatus::ClosedManual,
        }
    }
}

/// Errors from position creation and closing.
#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("{field} is not finite: {value}")]
    NonFiniteLevel { field: &'static str, value: f64 },

    #[error("{direction} levels out of order: stop={stop}, entry={entry}, target={target}")]
    InvalidLevels {
        direction: Direction,
        stop: f64,
        entry: f64,
        target: f64,
    },

    #[error("position size must be positive and finite, got {0}")]
    InvalidSize(f64),

    #[error("position {id} is not open (status: {status:?})")]
    NotOpen { id: PositionId, status: PositionStatus },
}

/// Parameters for a new position, after spread adjustment and sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPosition {
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub size: f64,
    pub strategy_label: String,
    /// Commission charged at entry, in account currency.
    pub commission: f64,
}

/// Check that all three levels are finite and ordered for `direction`.
///
/// Long: `stop < entry < target`. Short: `target < entry < stop`.
pub fn validate_levels(
    direction: Direction,
    entry_price: f64,
    stop_price: f64,
    target_price: f64,
) -> Result<(), PositionError> {
    for (field, value) in [
        ("entry_price", entry_price),
        ("stop_price", stop_price),
        ("target_price", target_price),
    ] {
        if !value.is_finite() {
            return Err(PositionError::NonFiniteLevel { field, value });
        }
    }

    let ordered = match direction {
        Direction::Long => stop_price < entry_price && entry_price < target_price,
        Direction::Short => target_price < entry_price && entry_price < stop_price,
    };
    if ordered {
        Ok(())
    } else {
        Err(PositionError::InvalidLevels {
            direction,
            stop: stop_price,
            entry: entry_price,
            target: target_price,
        })
    }
}

/// A simulated trade owned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    id: PositionId,
    opened_at: NaiveDateTime,
    direction: Direction,
    entry_price: f64,
    stop_price: f64,
    target_price: f64,
    size: f64,
    strategy_label: String,
    commission: f64,
    status: PositionStatus,
}

impl Position {
    /// Create an open position, rejecting non-finite or mis-ordered levels
    /// (see [`validate_levels`]) and non-positive sizes.
    pub fn open(
        id: PositionId,
        opened_at: NaiveDateTime,
        params: NewPosition,
    ) -> Result<Self, PositionError> {
        validate_levels(
            params.direction,
            params.entry_price,
            params.stop_price,
            params.target_price,
        )?;

        if !params.size.is_finite() || params.size <= 0.0 {
            return Err(PositionError::InvalidSize(params.size));
        }

        Ok(Self {
            id,
            opened_at,
            direction: params.direction,
            entry_price: params.entry_price,
            stop_price: params.stop_price,
            target_price: params.target_price,
            size: params.size,
            strategy_label: params.strategy_label,
            commission: params.commission,
            status: PositionStatus::Open,
        })
    }

    pub fn id(&self) -> PositionId {
        self.id
    }

    pub fn opened_at(&self) -> NaiveDateTime {
        self.opened_at
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn stop_price(&self) -> f64 {
        self.stop_price
    }

    pub fn target_price(&self) -> f64 {
        self.target_price
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn strategy_label(&self) -> &str {
        &self.strategy_label
    }

    pub fn commission(&self) -> f64 {
        self.commission
    }

    pub fn status(&self) -> PositionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Distance between entry and stop, in price units.
    pub fn stop_distance(&self) -> f64 {
        (self.entry_price - self.stop_price).abs()
    }

    /// Mark-to-market profit at `price`, in account currency.
    pub fn unrealized_pnl(&self, price: f64, pricing: &Pricing) -> f64 {
        settle(self.direction, self.entry_price, price, self.size, pricing).account_currency
    }

    /// Close the position and produce its ledger record.
    ///
    /// Fails with [`PositionError::NotOpen`] if the position was already closed;
    /// in that case nothing is mutated.
    pub fn close(
        &mut self,
        closed_at: NaiveDateTime,
        exit_price: f64,
        reason: ExitReason,
        pricing: &Pricing,
    ) -> Result<TradeRecord, PositionError> {
        if !self.is_open() {
            return Err(PositionError::NotOpen {
                id: self.id,
                status: self.status,
            });
        }
        if !exit_price.is_finite() {
            return Err(PositionError::NonFiniteLevel {
                field: "exit_price",
                value: exit_price,
            });
        }

        self.status = reason.into();
        let settlement = settle(self.direction, self.entry_price, exit_price, self.size, pricing);

        Ok(TradeRecord {
            position_id: self.id,
            strategy_label: self.strategy_label.clone(),
            direction: self.direction,
            opened_at: self.opened_at,
            entry_price: self.entry_price,
            stop_price: self.stop_price,
            target_price: self.target_price,
            size: self.size,
            closed_at,
            exit_price,
            exit_reason: reason,
            profit_in_price_units: settlement.price_units,
            profit_in_pips: settlement.pips,
            profit_in_account_currency: settlement.account_currency,
            commission: self.commission,
            net_profit: settlement.account_currency - self.commission,
        })
    }
}
