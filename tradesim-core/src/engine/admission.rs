//! Admission control: decide whether a bar's signal becomes a position.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. Flat signal: nothing to do, nothing counted.
//! 2. Malformed annotations → [`RejectionReason::MalformedSignal`]
//! 3. Open positions at capacity → [`RejectionReason::Capacity`]
//! 4. Risk limits breached → drawdown / exposure / consecutive losses
//!
//! Later stages (level validation, sizing) are run by the engine and report
//! their rejections back through [`AdmissionController::reject`], so every
//! rejection from every stage lands in the same counters.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::domain::{Bar, Direction, EntryRequest, Signal, SignalIntent};
use crate::engine::config::RiskLimits;
use crate::engine::risk::RiskState;

/// Why a signal was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    Capacity,
    MaxDrawdown,
    MaxExposure,
    ConsecutiveLosses,
    MalformedSignal,
    InvalidLevels,
    ZeroSize,
}

impl RejectionReason {
    pub const ALL: [RejectionReason; 7] = [
        RejectionReason::Capacity,
        RejectionReason::MaxDrawdown,
        RejectionReason::MaxExposure,
        RejectionReason::ConsecutiveLosses,
        RejectionReason::MalformedSignal,
        RejectionReason::InvalidLevels,
        RejectionReason::ZeroSize,
    ];
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Capacity => write!(f, "Capacity"),
            RejectionReason::MaxDrawdown => write!(f, "MaxDrawdown"),
            RejectionReason::MaxExposure => write!(f, "MaxExposure"),
            RejectionReason::ConsecutiveLosses => write!(f, "ConsecutiveLosses"),
            RejectionReason::MalformedSignal => write!(f, "MalformedSignal"),
            RejectionReason::InvalidLevels => write!(f, "InvalidLevels"),
            RejectionReason::ZeroSize => write!(f, "ZeroSize"),
        }
    }
}

/// Per-reason rejection counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounters {
    pub capacity: u64,
    pub max_drawdown: u64,
    pub max_exposure: u64,
    pub consecutive_losses: u64,
    pub malformed_signal: u64,
    pub invalid_levels: u64,
    pub zero_size: u64,
}

impl RejectionCounters {
    pub fn record(&mut self, reason: RejectionReason) {
        *self.slot(reason) += 1;
    }

    pub fn get(&self, reason: RejectionReason) -> u64 {
        match reason {
            RejectionReason::Capacity => self.capacity,
            RejectionReason::MaxDrawdown => self.max_drawdown,
            RejectionReason::MaxExposure => self.max_exposure,
            RejectionReason::ConsecutiveLosses => self.consecutive_losses,
            RejectionReason::MalformedSignal => self.malformed_signal,
            RejectionReason::InvalidLevels => self.invalid_levels,
            RejectionReason::ZeroSize => self.zero_size,
        }
    }

    pub fn total(&self) -> u64 {
        RejectionReason::ALL.iter().map(|r| self.get(*r)).sum()
    }

    fn slot(&mut self, reason: RejectionReason) -> &mut u64 {
        match reason {
            RejectionReason::Capacity => &mut self.capacity,
            RejectionReason::MaxDrawdown => &mut self.max_drawdown,
            RejectionReason::MaxExposure => &mut self.max_exposure,
            RejectionReason::ConsecutiveLosses => &mut self.consecutive_losses,
            RejectionReason::MalformedSignal => &mut self.malformed_signal,
            RejectionReason::InvalidLevels => &mut self.invalid_levels,
            RejectionReason::ZeroSize => &mut self.zero_size,
        }
    }
}

/// A rejected signal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSignal {
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub signal: Signal,
    pub reason: RejectionReason,
    pub context: String,
}

/// Stateful gatekeeper: applies the checks and keeps the rejection log.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    max_positions: usize,
    limits: RiskLimits,
    counters: RejectionCounters,
    rejected: Vec<RejectedSignal>,
    signals_seen: u64,
}

impl AdmissionController {
    pub fn new(max_positions: usize, limits: RiskLimits) -> Self {
        Self {
            max_positions,
            limits,
            counters: RejectionCounters::default(),
            rejected: Vec::new(),
            signals_seen: 0,
        }
    }

    /// Run the gating checks for one bar.
    ///
    /// Returns the entry request when every check passes. A rejection is
    /// recorded before returning `None`.
    pub fn evaluate(
        &mut self,
        bar: &Bar,
        bar_index: usize,
        open_positions: usize,
        risk: &RiskState,
    ) -> Option<EntryRequest> {
        let request = match bar.intent() {
            SignalIntent::None => return None,
            SignalIntent::Malformed(context) => {
                self.signals_seen += 1;
                self.reject(bar, bar_index, RejectionReason::MalformedSignal, context);
                return None;
            }
            SignalIntent::Entry(request) => {
                self.signals_seen += 1;
                request
            }
        };

        if open_positions >= self.max_positions {
            let context = format!("open={open_positions}, max_positions={}", self.max_positions);
            self.reject(bar, bar_index, RejectionReason::Capacity, context);
            return None;
        }

        if let Some((reason, context)) = risk.breach(&self.limits) {
            self.reject(bar, bar_index, reason, context);
            return None;
        }

        Some(request)
    }

    /// Record a rejection from any stage.
    pub fn reject(
        &mut self,
        bar: &Bar,
        bar_index: usize,
        reason: RejectionReason,
        context: impl Into<String>,
    ) {
        let context = context.into();
        debug!(bar_index, %reason, %context, "signal rejected");
        self.counters.record(reason);
        self.rejected.push(RejectedSignal {
            bar_index,
            timestamp: bar.timestamp,
            signal: bar.signal,
            reason,
            context,
        });
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn counters(&self) -> &RejectionCounters {
        &self.counters
    }

    pub fn rejected(&self) -> &[RejectedSignal] {
        &self.rejected
    }

    /// Non-flat signals observed, admitted or not.
    pub fn signals_seen(&self) -> u64 {
        self.signals_seen
    }

    pub fn into_parts(self) -> (RejectionCounters, Vec<RejectedSignal>, u64) {
        (self.counters, self.rejected, self.signals_seen)
    }
}

/// Entry price after paying half the spread: longs buy higher, shorts sell lower.
pub fn apply_spread(direction: Direction, reference_price: f64, spread: f64) -> f64 {
    reference_price + direction.sign() * spread / 2.0
}
