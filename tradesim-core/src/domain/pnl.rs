//! Profit settlement.
//!
//! [`settle`] is the only place where a price move is turned into profit.
//! Realized P&L at close, unrealized P&L in equity snapshots and the risk
//! state's exposure all go through [`Pricing`].

use serde::{Deserialize, Serialize};

use super::position::Direction;

/// Conversion constants from price movement to account currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// Account-currency value of a one-unit price move for one unit of size.
    pub unit_value_per_size: f64,
    /// Price increment of one pip, used for reporting only.
    pub pip_size: f64,
}

impl Pricing {
    pub fn new(unit_value_per_size: f64, pip_size: f64) -> Self {
        Self {
            unit_value_per_size,
            pip_size,
        }
    }

    /// Account-currency value of one unit of price movement for `size`.
    pub fn unit_value(&self, size: f64) -> f64 {
        size * self.unit_value_per_size
    }

    /// Gross notional of a position in account currency at `price`.
    pub fn notional(&self, size: f64, price: f64) -> f64 {
        (self.unit_value(size) * price).abs()
    }
}

/// Result of settling a price move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub price_units: f64,
    pub pips: f64,
    pub account_currency: f64,
}

/// Settle a move from `entry` to `exit` for a position of `size`.
///
/// `price_units = (exit − entry) × direction`, and the account-currency
/// amount scales that by `unit_value(size)`.
pub fn settle(direction: Direction, entry: f64, exit: f64, size: f64, pricing: &Pricing) -> Settlement {
    let price_units = (exit - entry) * direction.sign();
    let pips = if pricing.pip_size > 0.0 {
        price_units / pricing.pip_size
    } else {
        0.0
    };
    Settlement {
        price_units,
        pips,
        account_currency: price_units * pricing.unit_value(size),
    }
}
