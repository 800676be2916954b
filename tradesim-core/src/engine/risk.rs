//! Risk state: high-water mark, drawdown, exposure and losing streak.
//!
//! Owned by the engine and passed by reference to admission control and
//! sizing. Refreshed before every admission decision and after every close.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::TradeRecord;
use crate::engine::admission::RejectionReason;
use crate::engine::config::RiskLimits;

/// Lower bound of the drawdown component of the size adjustment.
const MIN_DRAWDOWN_FACTOR: f64 = 0.25;
/// Lower bound of the losing-streak component of the size adjustment.
const MIN_LOSS_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub peak_equity: f64,
    /// Percent below peak equity, e.g. 12.5.
    pub current_drawdown_pct: f64,
    /// Open notional as a percent of equity.
    pub current_exposure_pct: f64,
    pub consecutive_losses: u32,
}

impl RiskState {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            peak_equity: initial_equity,
            current_drawdown_pct: 0.0,
            current_exposure_pct: 0.0,
            consecutive_losses: 0,
        }
    }

    /// Update the high-water mark, drawdown and exposure from current equity.
    pub fn refresh(&mut self, equity: f64, open_notional: f64) {
        if equity > self.peak_equity {
            self.peak_equity = equity;
            debug!(peak = equity, "new equity high-water mark");
        }
        self.current_drawdown_pct = if self.peak_equity > 0.0 && equity < self.peak_equity {
            (self.peak_equity - equity) / self.peak_equity * 100.0
        } else {
            0.0
        };
        self.current_exposure_pct = if equity > 0.0 {
            open_notional / equity * 100.0
        } else if open_notional > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
    }

    /// Account for one closed trade: a winner resets the losing streak.
    pub fn record_close(&mut self, trade: &TradeRecord) {
        if trade.is_winner() {
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
        }
    }

    /// First configured limit that is currently breached, with context.
    ///
    /// Checked in order: drawdown, exposure, consecutive losses.
    pub fn breach(&self, limits: &RiskLimits) -> Option<(RejectionReason, String)> {
        if let Some(max) = limits.max_drawdown_pct {
            if self.current_drawdown_pct >= max {
                return Some((
                    RejectionReason::MaxDrawdown,
                    format!("drawdown={:.2}%, limit={max:.2}%", self.current_drawdown_pct),
                ));
            }
        }
        if let Some(max) = limits.max_exposure_pct {
            if self.current_exposure_pct >= max {
                return Some((
                    RejectionReason::MaxExposure,
                    format!("exposure={:.2}%, limit={max:.2}%", self.current_exposure_pct),
                ));
            }
        }
        if let Some(max) = limits.max_consecutive_losses {
            if self.consecutive_losses >= max {
                return Some((
                    RejectionReason::ConsecutiveLosses,
                    format!("losses={}, limit={max}", self.consecutive_losses),
                ));
            }
        }
        None
    }

    /// Size multiplier in `[0.125, 1]` that shrinks as drawdown and the losing
    /// streak approach their limits. Absent limits contribute 1.0.
    pub fn size_adjustment(&self, limits: &RiskLimits) -> f64 {
        let drawdown_factor = limits.max_drawdown_pct.map_or(1.0, |max| {
            (1.0 - self.current_drawdown_pct / max).clamp(MIN_DRAWDOWN_FACTOR, 1.0)
        });
        let loss_factor = limits.max_consecutive_losses.map_or(1.0, |max| {
            (1.0 - f64::from(self.consecutive_losses) / f64::from(max) * 0.5)
                .clamp(MIN_LOSS_FACTOR, 1.0)
        });
        drawdown_factor * loss_factor
    }
}
