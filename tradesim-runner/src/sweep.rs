//! Parameter sweeps over execution settings.
//!
//! A grid is the cartesian product of `max_positions × spread × tie_break`.
//! Every point runs an isolated engine over the same bar series on the rayon
//! pool; results come back in grid order regardless of scheduling.

use std::sync::atomic::AtomicBool;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use tradesim_core::domain::BarSeries;
use tradesim_core::engine::TieBreakPolicy;

use crate::config::BacktestConfig;
use crate::runner::{run_with_config, BacktestResult, RunError};

/// Values to sweep. An empty axis keeps the base config's value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepGrid {
    pub max_positions: Vec<usize>,
    pub spreads: Vec<f64>,
    pub tie_breaks: Vec<TieBreakPolicy>,
}

/// One grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub max_positions: usize,
    pub spread: f64,
    pub tie_break: TieBreakPolicy,
}

/// A grid point and the run it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub point: SweepPoint,
    pub result: BacktestResult,
}

impl SweepGrid {
    /// Returns the total number of points in this grid.
    pub fn size(&self) -> usize {
        self.max_positions.len().max(1) * self.spreads.len().max(1) * self.tie_breaks.len().max(1)
    }

    /// All points, `max_positions` outermost and `tie_break` innermost.
    pub fn points(&self, base: &BacktestConfig) -> Vec<SweepPoint> {
        let execution = &base.engine.execution;
        let max_positions = axis(&self.max_positions, execution.max_positions);
        let spreads = axis(&self.spreads, execution.spread);
        let tie_breaks = axis(&self.tie_breaks, execution.tie_break);

        let mut points = Vec::with_capacity(self.size());
        for &max_positions in &max_positions {
            for &spread in &spreads {
                for &tie_break in &tie_breaks {
                    points.push(SweepPoint {
                        max_positions,
                        spread,
                        tie_break,
                    });
                }
            }
        }
        points
    }
}

impl SweepPoint {
    /// The base config with this point's execution settings applied.
    pub fn apply(&self, base: &BacktestConfig) -> BacktestConfig {
        let mut config = base.clone();
        config.engine.execution.max_positions = self.max_positions;
        config.engine.execution.spread = self.spread;
        config.engine.execution.tie_break = self.tie_break;
        config.run.name = format!(
            "{}-mp{}-sp{}-{}",
            base.run.name, self.max_positions, self.spread, self.tie_break
        );
        config
    }
}

fn axis<T: Copy>(values: &[T], fallback: T) -> Vec<T> {
    if values.is_empty() {
        vec![fallback]
    } else {
        values.to_vec()
    }
}

/// Run every grid point in parallel.
///
/// Fails with the first error in grid order; an invalid point (for example
/// `max_positions = 0`) fails the whole sweep.
pub fn run_sweep(
    grid: &SweepGrid,
    base: &BacktestConfig,
    series: &BarSeries,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<SweepOutcome>, RunError> {
    let points = grid.points(base);
    info!(points = points.len(), bars = series.len(), "starting sweep");

    let outcomes = points
        .par_iter()
        .map(|point| {
            let config = point.apply(base);
            run_with_config(&config, series, cancel).map(|result| SweepOutcome {
                point: *point,
                result,
            })
        })
        .collect::<Result<Vec<_>, RunError>>()?;

    info!(points = outcomes.len(), "sweep complete");
    Ok(outcomes)
}
