//! Engine configuration with documented defaults and fail-fast validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Pricing;
use crate::engine::exit::TieBreakPolicy;

/// Configuration errors. All are fatal: the engine refuses to start.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("initial_balance must be positive and finite, got {0}")]
    InitialBalance(f64),

    #[error("max_positions must be at least 1")]
    MaxPositions,

    #[error("spread must be non-negative and finite, got {0}")]
    Spread(f64),

    #[error("{field} must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be non-negative and finite, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must lie in {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: f64,
    },

    #[error("min_position_size {min} exceeds base_position_size {base}")]
    MinAboveBase { min: f64, base: f64 },

    #[error("max_consecutive_losses must be at least 1")]
    ConsecutiveLosses,
}

/// Account and currency-conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccountConfig {
    /// Starting balance in account currency.
    pub initial_balance: f64,
    /// Account-currency value of a one-unit price move per unit size.
    pub unit_value_per_size: f64,
    /// Pip increment, for reporting profit in pips.
    pub pip_size: f64,
    /// Commission charged at entry per unit of size.
    pub commission_per_size: f64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_balance: 1_000_000.0,
            unit_value_per_size: 100_000.0,
            pip_size: 0.01,
            commission_per_size: 0.0,
        }
    }
}

/// Fill and capacity settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Maximum simultaneously open positions.
    pub max_positions: usize,
    /// Full bid/ask spread in price units; entries pay half of it.
    pub spread: f64,
    /// Which exit wins when a bar touches both stop and target.
    pub tie_break: TieBreakPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_positions: 5,
            spread: 0.002,
            tie_break: TieBreakPolicy::StopLossFirst,
        }
    }
}

/// Which sizer variant to build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizerMode {
    /// Base size with win-rate escalation.
    #[default]
    Fixed,
    /// Base size refined by signal quality and volatility.
    Dynamic,
}

/// Position sizing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SizingConfig {
    pub mode: SizerMode,
    pub base_position_size: f64,
    pub min_position_size: f64,
    /// Fraction of balance that may be lost at the stop. `None` disables the ceiling.
    pub max_risk_fraction: Option<f64>,
    /// Rolling win rate (fraction) at or above which sizes are escalated.
    pub win_rate_escalation_threshold: f64,
    pub win_rate_escalation_multiplier: f64,
    /// Shrink sizes as drawdown and losing streaks approach their limits.
    pub risk_scaling: bool,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            mode: SizerMode::Fixed,
            base_position_size: 0.01,
            min_position_size: 0.01,
            max_risk_fraction: Some(0.02),
            win_rate_escalation_threshold: 0.8,
            win_rate_escalation_multiplier: 2.0,
            risk_scaling: false,
        }
    }
}

/// Circuit-breaker limits. An absent limit never trips.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RiskLimits {
    /// Percent drawdown from peak equity (e.g. 10.0).
    pub max_drawdown_pct: Option<f64>,
    /// Percent of equity held as open notional (e.g. 20.0).
    pub max_exposure_pct: Option<f64>,
    pub max_consecutive_losses: Option<u32>,
}

/// Configuration for a single engine instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub account: AccountConfig,
    pub execution: ExecutionConfig,
    pub sizing: SizingConfig,
    pub risk: RiskLimits,
}

impl EngineConfig {
    /// Defaults with a different starting balance and capacity.
    pub fn new(initial_balance: f64, max_positions: usize) -> Self {
        let mut config = Self::default();
        config.account.initial_balance = initial_balance;
        config.execution.max_positions = max_positions;
        config
    }

    pub fn pricing(&self) -> Pricing {
        Pricing::new(self.account.unit_value_per_size, self.account.pip_size)
    }

    /// Check every option; the first violation is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let account = &self.account;
        if !(account.initial_balance.is_finite() && account.initial_balance > 0.0) {
            return Err(ConfigError::InitialBalance(account.initial_balance));
        }
        positive("unit_value_per_size", account.unit_value_per_size)?;
        positive("pip_size", account.pip_size)?;
        non_negative("commission_per_size", account.commission_per_size)?;

        let execution = &self.execution;
        if execution.max_positions == 0 {
            return Err(ConfigError::MaxPositions);
        }
        if !(execution.spread.is_finite() && execution.spread >= 0.0) {
            return Err(ConfigError::Spread(execution.spread));
        }

        let sizing = &self.sizing;
        positive("base_position_size", sizing.base_position_size)?;
        non_negative("min_position_size", sizing.min_position_size)?;
        if sizing.min_position_size > sizing.base_position_size {
            return Err(ConfigError::MinAboveBase {
                min: sizing.min_position_size,
                base: sizing.base_position_size,
            });
        }
        if let Some(fraction) = sizing.max_risk_fraction {
            in_range("max_risk_fraction", "(0, 1]", fraction, |v| v > 0.0 && v <= 1.0)?;
        }
        in_range(
            "win_rate_escalation_threshold",
            "[0, 1]",
            sizing.win_rate_escalation_threshold,
            |v| (0.0..=1.0).contains(&v),
        )?;
        positive(
            "win_rate_escalation_multiplier",
            sizing.win_rate_escalation_multiplier,
        )?;

        let risk = &self.risk;
        if let Some(pct) = risk.max_drawdown_pct {
            in_range("max_drawdown_pct", "(0, 100]", pct, |v| v > 0.0 && v <= 100.0)?;
        }
        if let Some(pct) = risk.max_exposure_pct {
            positive("max_exposure_pct", pct)?;
        }
        if risk.max_consecutive_losses == Some(0) {
            return Err(ConfigError::ConsecutiveLosses);
        }

        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn in_range(
    field: &'static str,
    range: &'static str,
    value: f64,
    ok: impl Fn(f64) -> bool,
) -> Result<(), ConfigError> {
    if value.is_finite() && ok(value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            range,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn new_overrides_balance_and_capacity() {
        let config = EngineConfig::new(200_000.0, 3);
        assert_eq!(config.account.initial_balance, 200_000.0);
        assert_eq!(config.execution.max_positions, 3);
        assert_eq!(config.execution.tie_break, TieBreakPolicy::StopLossFirst);
    }

    #[test]
    fn rejects_non_positive_balance() {
        let config = EngineConfig::new(-1.0, 1);
        assert_eq!(config.validate(), Err(ConfigError::InitialBalance(-1.0)));
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = EngineConfig::new(1_000.0, 0);
        assert_eq!(config.validate(), Err(ConfigError::MaxPositions));
    }

    #[test]
    fn rejects_negative_spread() {
        let mut config = EngineConfig::default();
        config.execution.spread = -0.1;
        assert_eq!(config.validate(), Err(ConfigError::Spread(-0.1)));
    }

    #[test]
    fn rejects_threshold_above_one() {
        let mut config = EngineConfig::default();
        config.sizing.win_rate_escalation_threshold = 80.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "win_rate_escalation_threshold",
                ..
            })
        ));
    }

    #[test]
    fn rejects_zero_loss_limit() {
        let mut config = EngineConfig::default();
        config.risk.max_consecutive_losses = Some(0);
        assert_eq!(config.validate(), Err(ConfigError::ConsecutiveLosses));
    }

    #[test]
    fn rejects_min_above_base() {
        let mut config = EngineConfig::default();
        config.sizing.min_position_size = 0.05;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MinAboveBase { .. })
        ));
    }

    #[test]
    fn sections_deserialize_with_defaults() {
        let json = r#"{"execution":{"max_positions":2,"tie_break":"take_profit_first"}}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.execution.max_positions, 2);
        assert_eq!(config.execution.tie_break, TieBreakPolicy::TakeProfitFirst);
        assert_eq!(config.account, AccountConfig::default());
    }
}
