//! Dynamic Position Sizer
//!
//! Refines the base size by signal quality and market volatility:
//!
//! - quality factor: `0.5 + quality / 3`, so quality 0..=3 maps to 0.5..=1.5
//! - volatility factor: `1 / volatility_ratio`, clamped to `[0.5, 1.5]`
//!
//! A missing annotation contributes a neutral factor of 1.0.

use crate::sizers::{Sizer, SizingInput, SizingRules};

const MIN_VOLATILITY_FACTOR: f64 = 0.5;
const MAX_VOLATILITY_FACTOR: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct DynamicSizer {
    rules: SizingRules,
}

impl DynamicSizer {
    pub fn new(rules: SizingRules) -> Self {
        Self { rules }
    }

    pub fn quality_factor(quality: Option<u8>) -> f64 {
        quality.map_or(1.0, |q| 0.5 + f64::from(q) / 3.0)
    }

    pub fn volatility_factor(ratio: Option<f64>) -> f64 {
        match ratio {
            Some(r) if r > 0.0 => (1.0 / r).clamp(MIN_VOLATILITY_FACTOR, MAX_VOLATILITY_FACTOR),
            _ => 1.0,
        }
    }
}

impl Sizer for DynamicSizer {
    fn size(&self, input: &SizingInput) -> f64 {
        let computed = self.rules.starting_size(input)
            * self.rules.escalation(input.rolling_win_rate)
            * Self::quality_factor(input.signal_quality)
            * Self::volatility_factor(input.volatility_ratio)
            * input.risk_adjustment;
        self.rules.finish(computed, input)
    }

    fn name(&self) -> &str {
        "Dynamic"
    }
}
