//! Serializable backtest configuration, loaded from TOML.
//!
//! A config file has a `[run]` section naming the run and (optionally) the
//! bar file, followed by the engine sections `[account]`, `[execution]`,
//! `[sizing]` and `[risk]`. Every field has a default, so an empty file is a
//! valid configuration.
//!
//! ```toml
//! [run]
//! name = "eurjpy_h1"
//! bars = "data/eurjpy_h1.csv"
//!
//! [account]
//! initial_balance = 1000000.0
//!
//! [execution]
//! max_positions = 5
//! spread = 0.002
//! tie_break = "stop_loss_first"
//!
//! [risk]
//! max_drawdown_pct = 20.0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tradesim_core::engine::{ConfigError as EngineConfigError, EngineConfig};

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

/// Errors from reading and validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid engine configuration: {0}")]
    Engine(#[from] EngineConfigError),

    #[error("failed to encode config for hashing: {0}")]
    Encode(#[from] serde_json::Error),
}

/// `[run]` section: run metadata that does not affect the simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunSection {
    pub name: String,
    /// CSV bar file. Relative paths resolve against the config file's directory.
    pub bars: Option<PathBuf>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            name: "backtest".into(),
            bars: None,
        }
    }
}

/// Complete configuration for a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BacktestConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(flatten)]
    pub engine: EngineConfig,
}

impl BacktestConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: BacktestConfig = toml::from_str(toml_str)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// A relative `run.bars` path is rewritten relative to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;
        if let (Some(bars), Some(dir)) = (config.run.bars.as_ref(), path.parent()) {
            if bars.is_relative() {
                config.run.bars = Some(dir.join(bars));
            }
        }
        Ok(config)
    }

    /// Deterministic hash of the engine configuration.
    ///
    /// Two configs that would simulate identically share a RunId; the `[run]`
    /// section is excluded so renaming a run does not change its identity.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(&self.engine)?;
        let hash = blake3::hash(json.as_bytes());
        Ok(hash.to_hex().to_string())
    }
}
