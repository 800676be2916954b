//! Bar: one time step of prices plus the strategy's annotations.
//!
//! Bars are produced upstream (signal generation, resampling) and are read-only
//! to the engine. Annotations are optional fields with explicit defaults; they
//! are interpreted once per bar by [`Bar::intent`], which turns them into either
//! a well-formed [`EntryRequest`] or a [`SignalIntent::Malformed`] rejection.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::position::Direction;

/// Label used when a signalling bar carries no strategy label.
pub const UNLABELED_STRATEGY: &str = "unlabeled";

/// Errors raised while building a bar stream. All of these are fatal.
#[derive(Debug, Error, PartialEq)]
pub enum BarError {
    #[error("bar stream is empty")]
    Empty,

    #[error("bar {index} at {current} is earlier than the previous bar at {previous}")]
    NonMonotonic {
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("bar {index} repeats timestamp {timestamp}")]
    DuplicateTimestamp {
        index: usize,
        timestamp: NaiveDateTime,
    },

    #[error("invalid signal value {0} (expected -1, 0 or 1)")]
    InvalidSignal(i8),
}

/// Directional signal attached to a bar: −1, 0 or +1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Signal {
    Short,
    #[default]
    Flat,
    Long,
}

impl Signal {
    /// Direction of the position this signal asks for, `None` when flat.
    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Long => Some(Direction::Long),
            Signal::Short => Some(Direction::Short),
            Signal::Flat => None,
        }
    }

    pub fn is_flat(self) -> bool {
        self == Signal::Flat
    }
}

impl TryFrom<i8> for Signal {
    type Error = BarError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Signal::Short),
            0 => Ok(Signal::Flat),
            1 => Ok(Signal::Long),
            other => Err(BarError::InvalidSignal(other)),
        }
    }
}

impl From<Signal> for i8 {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Short => -1,
            Signal::Flat => 0,
            Signal::Long => 1,
        }
    }
}

/// One time step: OHLC prices plus strategy annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,

    // ── Strategy annotations ──
    #[serde(default)]
    pub signal: Signal,
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub stop_price: Option<f64>,
    #[serde(default)]
    pub target_price: Option<f64>,
    #[serde(default)]
    pub strategy_label: Option<String>,
    /// Explicit position size; replaces the configured base size when present.
    #[serde(default)]
    pub explicit_size: Option<f64>,
    /// Signal quality score in `0..=3`, consumed by the dynamic sizer.
    #[serde(default)]
    pub signal_quality: Option<u8>,
    /// Current-to-average volatility ratio, consumed by the dynamic sizer.
    #[serde(default)]
    pub volatility_ratio: Option<f64>,
}

impl Bar {
    /// A bar with prices only and no signal.
    pub fn new(timestamp: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            signal: Signal::Flat,
            entry_price: None,
            stop_price: None,
            target_price: None,
            strategy_label: None,
            explicit_size: None,
            signal_quality: None,
            volatility_ratio: None,
        }
    }

    /// Attach a directional signal with its protective levels.
    pub fn with_signal(mut self, signal: Signal, stop_price: f64, target_price: f64) -> Self {
        self.signal = signal;
        self.stop_price = Some(stop_price);
        self.target_price = Some(target_price);
        self
    }

    pub fn with_entry_price(mut self, entry_price: f64) -> Self {
        self.entry_price = Some(entry_price);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.strategy_label = Some(label.into());
        self
    }

    pub fn with_explicit_size(mut self, size: f64) -> Self {
        self.explicit_size = Some(size);
        self
    }

    pub fn with_quality(mut self, quality: u8, volatility_ratio: f64) -> Self {
        self.signal_quality = Some(quality);
        self.volatility_ratio = Some(volatility_ratio);
        self
    }

    /// Returns true if any OHLC field is non-finite (void bar).
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }

    /// Interpret the annotations of this bar.
    pub fn intent(&self) -> SignalIntent {
        let Some(direction) = self.signal.direction() else {
            return SignalIntent::None;
        };
        if self.is_void() {
            return SignalIntent::Malformed("non-finite OHLC on signalling bar".into());
        }

        let Some(stop_price) = self.stop_price else {
            return SignalIntent::Malformed("missing stop_price".into());
        };
        let Some(target_price) = self.target_price else {
            return SignalIntent::Malformed("missing target_price".into());
        };

        let prices = [
            ("entry_price", self.entry_price),
            ("stop_price", Some(stop_price)),
            ("target_price", Some(target_price)),
        ];
        for (field, value) in prices {
            if let Some(v) = value {
                if !v.is_finite() {
                    return SignalIntent::Malformed(format!("non-finite {field}: {v}"));
                }
            }
        }

        if let Some(size) = self.explicit_size {
            if !size.is_finite() || size <= 0.0 {
                return SignalIntent::Malformed(format!("invalid explicit_size: {size}"));
            }
        }
        if let Some(quality) = self.signal_quality {
            if quality > 3 {
                return SignalIntent::Malformed(format!("signal_quality {quality} outside 0..=3"));
            }
        }
        if let Some(ratio) = self.volatility_ratio {
            if !ratio.is_finite() || ratio <= 0.0 {
                return SignalIntent::Malformed(format!("invalid volatility_ratio: {ratio}"));
            }
        }

        SignalIntent::Entry(EntryRequest {
            direction,
            reference_price: self.entry_price.unwrap_or(self.close),
            stop_price,
            target_price,
            strategy_label: self
                .strategy_label
                .clone()
                .unwrap_or_else(|| UNLABELED_STRATEGY.to_string()),
            explicit_size: self.explicit_size,
            signal_quality: self.signal_quality,
            volatility_ratio: self.volatility_ratio,
        })
    }
}

/// What a bar asks the engine to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalIntent {
    /// Flat signal: nothing to admit.
    None,
    /// Well-formed entry request.
    Entry(EntryRequest),
    /// Signal present but annotations unusable; the reason is kept for diagnostics.
    Malformed(String),
}

/// A validated request to open a position, before spread and sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRequest {
    pub direction: Direction,
    /// Price the spread is applied to: the entry annotation, or the bar close.
    pub reference_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub strategy_label: String,
    pub explicit_size: Option<f64>,
    pub signal_quality: Option<u8>,
    pub volatility_ratio: Option<f64>,
}

/// A validated, strictly increasing, non-empty sequence of bars.
#[derive(Debug, Clone)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Validate and wrap a bar stream.
    ///
    /// Fails if the stream is empty, goes backwards in time, or repeats a timestamp.
    pub fn new(bars: Vec<Bar>) -> Result<Self, BarError> {
        if bars.is_empty() {
            return Err(BarError::Empty);
        }
        for (index, pair) in bars.windows(2).enumerate() {
            let (previous, current) = (pair[0].timestamp, pair[1].timestamp);
            if current == previous {
                return Err(BarError::DuplicateTimestamp {
                    index: index + 1,
                    timestamp: current,
                });
            }
            if current < previous {
                return Err(BarError::NonMonotonic {
                    index: index + 1,
                    previous,
                    current,
                });
            }
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> &Bar {
        &self.bars[0]
    }

    pub fn last(&self) -> &Bar {
        &self.bars[self.bars.len() - 1]
    }

    pub fn into_inner(self) -> Vec<Bar> {
        self.bars
    }
}

impl AsRef<[Bar]> for BarSeries {
    fn as_ref(&self) -> &[Bar] {
        &self.bars
    }
}
