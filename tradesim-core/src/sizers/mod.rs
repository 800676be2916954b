//! Position Sizers: determine trade size
//!
//! Every sizer follows the same pipeline:
//!
//! 1. Start from the bar's explicit size, or the configured base size.
//! 2. Multiply by the escalation factor when the rolling win rate is at or
//!    above the threshold. Recomputed on every call, so it falls away as soon
//!    as the win rate drops.
//! 3. Apply the variant's own refinement (quality/volatility for [`DynamicSizer`]).
//! 4. Apply the optional drawdown/loss-streak reduction.
//! 5. Cap at the risk ceiling, then floor at the minimum size.
//!
//! A result of zero is a rejection, never a zero-size position.

pub mod dynamic;
pub mod fixed;

pub use dynamic::DynamicSizer;
pub use fixed::FixedSizer;

use crate::domain::Pricing;
use crate::engine::config::{SizerMode, SizingConfig};

/// Everything a sizer may look at for one entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingInput {
    /// Realized account balance.
    pub balance: f64,
    pub explicit_size: Option<f64>,
    pub signal_quality: Option<u8>,
    pub volatility_ratio: Option<f64>,
    /// Distance from the spread-adjusted entry to the stop, in price units.
    pub stop_distance: f64,
    /// Wins over closed trades, as a fraction.
    pub rolling_win_rate: f64,
    /// Multiplier in `(0, 1]` from the risk state; 1.0 when risk scaling is off.
    pub risk_adjustment: f64,
}

/// Position sizing logic
///
/// # Responsibilities
/// - Convert balance + annotations + rolling statistics → position size
/// - Respect the risk ceiling and the minimum size
///
/// # Non-Responsibilities
/// - Sizers do NOT decide whether to enter (that's admission control)
/// - Sizers do NOT hold state between calls
pub trait Sizer: Send + Sync {
    /// Size for one entry. Returns 0.0 when no position should be opened.
    fn size(&self, input: &SizingInput) -> f64;

    /// Sizer name for manifest/logging
    fn name(&self) -> &str;
}

/// Steps shared by all sizer variants.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingRules {
    pub base_position_size: f64,
    pub min_position_size: f64,
    pub max_risk_fraction: Option<f64>,
    pub escalation_threshold: f64,
    pub escalation_multiplier: f64,
    pub unit_value_per_size: f64,
}

impl SizingRules {
    pub fn from_config(config: &SizingConfig, pricing: &Pricing) -> Self {
        Self {
            base_position_size: config.base_position_size,
            min_position_size: config.min_position_size,
            max_risk_fraction: config.max_risk_fraction,
            escalation_threshold: config.win_rate_escalation_threshold,
            escalation_multiplier: config.win_rate_escalation_multiplier,
            unit_value_per_size: pricing.unit_value_per_size,
        }
    }

    /// Explicit size if the bar carries one, else the base size.
    pub fn starting_size(&self, input: &SizingInput) -> f64 {
        input.explicit_size.unwrap_or(self.base_position_size)
    }

    pub fn escalation(&self, rolling_win_rate: f64) -> f64 {
        if rolling_win_rate >= self.escalation_threshold {
            self.escalation_multiplier
        } else {
            1.0
        }
    }

    /// Largest size whose loss at the stop stays within the risk fraction.
    pub fn risk_ceiling(&self, input: &SizingInput) -> f64 {
        let Some(fraction) = self.max_risk_fraction else {
            return f64::INFINITY;
        };
        let loss_per_size = input.stop_distance * self.unit_value_per_size;
        if loss_per_size <= 0.0 {
            return f64::INFINITY;
        }
        input.balance * fraction / loss_per_size
    }

    /// Cap at the ceiling, floor at the minimum. Non-positive balance sizes to zero.
    pub fn finish(&self, computed: f64, input: &SizingInput) -> f64 {
        if input.balance <= 0.0 || !computed.is_finite() || computed <= 0.0 {
            return 0.0;
        }
        let capped = computed.min(self.risk_ceiling(input));
        capped.max(self.min_position_size)
    }
}

/// Build the sizer selected by the configuration.
pub fn build_sizer(config: &SizingConfig, pricing: &Pricing) -> Box<dyn Sizer> {
    let rules = SizingRules::from_config(config, pricing);
    match config.mode {
        SizerMode::Fixed => Box::new(FixedSizer::new(rules)),
        SizerMode::Dynamic => Box::new(DynamicSizer::new(rules)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn rules() -> SizingRules {
        SizingRules {
            base_position_size: 0.01,
            min_position_size: 0.01,
            max_risk_fraction: None,
            escalation_threshold: 0.8,
            escalation_multiplier: 2.0,
            unit_value_per_size: 100_000.0,
        }
    }

    pub fn input() -> SizingInput {
        SizingInput {
            balance: 1_000_000.0,
            explicit_size: None,
            signal_quality: None,
            volatility_ratio: None,
            stop_distance: 0.1,
            rolling_win_rate: 0.0,
            risk_adjustment: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{input, rules};
    use super::*;

    #[test]
    fn escalation_applies_at_threshold_only() {
        let r = rules();
        assert_eq!(r.escalation(0.79), 1.0);
        assert_eq!(r.escalation(0.8), 2.0);
        assert_eq!(r.escalation(1.0), 2.0);
    }

    #[test]
    fn ceiling_limits_loss_at_stop() {
        let mut r = rules();
        r.max_risk_fraction = Some(0.02);
        // 1_000_000 × 0.02 / (0.1 × 100_000) = 2.0
        assert!((r.risk_ceiling(&input()) - 2.0).abs() < 1e-9);
        assert!((r.finish(5.0, &input()) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn finish_floors_at_minimum() {
        let r = rules();
        assert_eq!(r.finish(0.001, &input()), 0.01);
    }

    #[test]
    fn finish_is_zero_without_balance() {
        let r = rules();
        let mut i = input();
        i.balance = -10.0;
        assert_eq!(r.finish(0.01, &i), 0.0);
    }

    #[test]
    fn build_sizer_follows_mode() {
        let pricing = Pricing::new(100_000.0, 0.01);
        let mut config = SizingConfig::default();
        assert_eq!(build_sizer(&config, &pricing).name(), "Fixed");
        config.mode = SizerMode::Dynamic;
        assert_eq!(build_sizer(&config, &pricing).name(), "Dynamic");
    }
}
