//! Exit evaluation: decide which open positions a bar closes.
//!
//! Evaluation is a read-only pass over the open set: it returns decisions and
//! never mutates positions. The engine applies the decisions afterwards.
//!
//! When a single bar's range touches both the stop and the target (a
//! gap-through bar), [`TieBreakPolicy`] decides which exit is taken. The
//! default, [`TieBreakPolicy::StopLossFirst`], is the conservative reading.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Direction, ExitReason, Position, PositionId};

/// Resolution rule for bars that hit both stop-loss and take-profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// Assume the adverse level was reached first.
    #[default]
    StopLossFirst,
    /// Assume the favorable level was reached first.
    TakeProfitFirst,
    /// Infer the path from OHLC: if the open is at least as close to the high
    /// as to the low, the high is assumed to trade first (O→H→L→C), otherwise
    /// the low (O→L→H→C).
    OhlcPath,
}

impl TieBreakPolicy {
    pub const ALL: [TieBreakPolicy; 3] = [
        TieBreakPolicy::StopLossFirst,
        TieBreakPolicy::TakeProfitFirst,
        TieBreakPolicy::OhlcPath,
    ];
}

/// Same spelling as the config value.
impl fmt::Display for TieBreakPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreakPolicy::StopLossFirst => write!(f, "stop_loss_first"),
            TieBreakPolicy::TakeProfitFirst => write!(f, "take_profit_first"),
            TieBreakPolicy::OhlcPath => write!(f, "ohlc_path"),
        }
    }
}

/// One position that must close on this bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitDecision {
    pub position_id: PositionId,
    pub exit_price: f64,
    pub reason: ExitReason,
}

/// Decide whether `bar` closes `position`.
///
/// Long: `high ≥ target` → TakeProfit at target; `low ≤ stop` → StopLoss at stop.
/// Short is mirrored. Exits fill at the level itself, not at the bar extreme.
pub fn evaluate_exit(bar: &Bar, position: &Position, policy: TieBreakPolicy) -> Option<ExitDecision> {
    if bar.is_void() || !position.is_open() {
        return None;
    }

    let (target_hit, stop_hit) = match position.direction() {
        Direction::Long => (
            bar.high >= position.target_price(),
            bar.low <= position.stop_price(),
        ),
        Direction::Short => (
            bar.low <= position.target_price(),
            bar.high >= position.stop_price(),
        ),
    };

    let reason = match (target_hit, stop_hit) {
        (false, false) => return None,
        (true, false) => ExitReason::TakeProfit,
        (false, true) => ExitReason::StopLoss,
        (true, true) => resolve_tie(bar, position.direction(), policy),
    };

    let exit_price = match reason {
        ExitReason::TakeProfit => position.target_price(),
        _ => position.stop_price(),
    };

    Some(ExitDecision {
        position_id: position.id(),
        exit_price,
        reason,
    })
}

/// Evaluate every open position in insertion order.
pub fn evaluate_exits(bar: &Bar, positions: &[Position], policy: TieBreakPolicy) -> Vec<ExitDecision> {
    positions
        .iter()
        .filter_map(|position| evaluate_exit(bar, position, policy))
        .collect()
}

fn resolve_tie(bar: &Bar, direction: Direction, policy: TieBreakPolicy) -> ExitReason {
    match policy {
        TieBreakPolicy::StopLossFirst => ExitReason::StopLoss,
        TieBreakPolicy::TakeProfitFirst => ExitReason::TakeProfit,
        TieBreakPolicy::OhlcPath => {
            let high_first = (bar.open - bar.high).abs() <= (bar.open - bar.low).abs();
            match (direction, high_first) {
                (Direction::Long, true) | (Direction::Short, false) => ExitReason::TakeProfit,
                (Direction::Long, false) | (Direction::Short, true) => ExitReason::StopLoss,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewPosition;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn long(id: u64) -> Position {
        Position::open(
            PositionId(id),
            ts(),
            NewPosition {
                direction: Direction::Long,
                entry_price: 100.0,
                stop_price: 99.9,
                target_price: 100.2,
                size: 0.01,
                strategy_label: "test".into(),
                commission: 0.0,
            },
        )
        .unwrap()
    }

    fn short(id: u64) -> Position {
        Position::open(
            PositionId(id),
            ts(),
            NewPosition {
                direction: Direction::Short,
                entry_price: 100.0,
                stop_price: 100.1,
                target_price: 99.8,
                size: 0.01,
                strategy_label: "test".into(),
                commission: 0.0,
            },
        )
        .unwrap()
    }

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(ts(), open, high, low, close)
    }

    #[test]
    fn long_take_profit_fills_at_target() {
        let d = evaluate_exit(&bar(100.0, 100.25, 99.95, 100.1), &long(1), TieBreakPolicy::default())
            .unwrap();
        assert_eq!(d.reason, ExitReason::TakeProfit);
        assert_eq!(d.exit_price, 100.2);
    }

    #[test]
    fn long_stop_fills_at_stop() {
        let d = evaluate_exit(&bar(100.0, 100.05, 99.85, 99.9), &long(1), TieBreakPolicy::default())
            .unwrap();
        assert_eq!(d.reason, ExitReason::StopLoss);
        assert_eq!(d.exit_price, 99.9);
    }

    #[test]
    fn short_is_mirrored() {
        let tp = evaluate_exit(&bar(100.0, 100.05, 99.75, 99.8), &short(1), TieBreakPolicy::default())
            .unwrap();
        assert_eq!(tp.reason, ExitReason::TakeProfit);
        assert_eq!(tp.exit_price, 99.8);

        let sl = evaluate_exit(&bar(100.0, 100.15, 99.95, 100.1), &short(1), TieBreakPolicy::default())
            .unwrap();
        assert_eq!(sl.reason, ExitReason::StopLoss);
        assert_eq!(sl.exit_price, 100.1);
    }

    #[test]
    fn untouched_position_stays_open() {
        assert!(evaluate_exit(&bar(100.0, 100.1, 99.95, 100.05), &long(1), TieBreakPolicy::default())
            .is_none());
    }

    #[test]
    fn gap_through_defaults_to_stop_loss() {
        let wide = bar(100.0, 100.3, 99.8, 100.0);
        let d = evaluate_exit(&wide, &long(1), TieBreakPolicy::StopLossFirst).unwrap();
        assert_eq!(d.reason, ExitReason::StopLoss);
        let d = evaluate_exit(&wide, &short(2), TieBreakPolicy::StopLossFirst).unwrap();
        assert_eq!(d.reason, ExitReason::StopLoss);
    }

    #[test]
    fn gap_through_take_profit_first() {
        let wide = bar(100.0, 100.3, 99.7, 100.0);
        let d = evaluate_exit(&wide, &long(1), TieBreakPolicy::TakeProfitFirst).unwrap();
        assert_eq!(d.reason, ExitReason::TakeProfit);
        assert_eq!(d.exit_price, 100.2);
    }

    #[test]
    fn gap_through_ohlc_path_follows_open_proximity() {
        // Open near the high: high trades first.
        let up_first = bar(100.25, 100.3, 99.7, 100.0);
        assert_eq!(
            evaluate_exit(&up_first, &long(1), TieBreakPolicy::OhlcPath).unwrap().reason,
            ExitReason::TakeProfit
        );
        assert_eq!(
            evaluate_exit(&up_first, &short(2), TieBreakPolicy::OhlcPath).unwrap().reason,
            ExitReason::StopLoss
        );

        // Open near the low: low trades first.
        let down_first = bar(99.75, 100.3, 99.7, 100.0);
        assert_eq!(
            evaluate_exit(&down_first, &long(1), TieBreakPolicy::OhlcPath).unwrap().reason,
            ExitReason::StopLoss
        );
        assert_eq!(
            evaluate_exit(&down_first, &short(2), TieBreakPolicy::OhlcPath).unwrap().reason,
            ExitReason::TakeProfit
        );
    }

    #[test]
    fn void_bar_closes_nothing() {
        let void = bar(f64::NAN, 200.0, 0.0, 100.0);
        assert!(evaluate_exits(&void, &[long(1), short(2)], TieBreakPolicy::default()).is_empty());
    }

    #[test]
    fn evaluation_is_idempotent_and_ordered() {
        let positions = vec![long(1), short(2), long(3)];
        let b = bar(100.0, 100.25, 99.95, 100.2);
        let first = evaluate_exits(&b, &positions, TieBreakPolicy::default());
        let second = evaluate_exits(&b, &positions, TieBreakPolicy::default());
        assert_eq!(first, second);
        let ids: Vec<_> = first.iter().map(|d| d.position_id).collect();
        assert_eq!(ids, vec![PositionId(1), PositionId(2), PositionId(3)]);
        // Short #2 is stopped out at 100.1 while both longs take profit.
        assert_eq!(first[1].reason, ExitReason::StopLoss);
    }

    #[test]
    fn display_matches_config_spelling() {
        for policy in TieBreakPolicy::ALL {
            let json = serde_json::to_string(&policy).unwrap();
            assert_eq!(json, format!("\"{policy}\""));
        }
    }
}
