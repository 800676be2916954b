//! Performance metrics: pure functions over the trade ledger and equity curve.
//!
//! Every metric is a pure function of its inputs, so recomputing a summary
//! from the same ledger always gives identical numbers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tradesim_core::domain::{EquitySnapshot, ExitReason, TradeRecord};
use tradesim_core::engine::{RejectionCounters, RunResult};

/// Aggregate statistics for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub trade_count: usize,
    pub wins: usize,
    /// Non-winning trades, break-even included. Same rule as the losing streak.
    pub losses: usize,
    pub win_rate: f64,
    pub gross_profit: f64,
    /// Sum of losing trades' net profit, as a positive number.
    pub gross_loss: f64,
    pub net_profit: f64,
    /// `+inf` when there are no losses but some profit; persisted as `"inf"`.
    #[serde(with = "infinite_as_string")]
    pub profit_factor: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub total_commission: f64,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_return: f64,
    pub peak_equity: f64,
    pub max_drawdown: f64,
    pub exit_reasons: ExitReasonCounts,
    pub monthly: Vec<MonthlyBucket>,
    pub rejections: RejectionCounters,
}

/// How many trades closed for each reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitReasonCounts {
    pub take_profit: usize,
    pub stop_loss: usize,
    pub manual: usize,
}

/// Trades grouped by the calendar month they closed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    /// `YYYY-MM`
    pub month: String,
    pub trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub profit: f64,
    pub pips: f64,
}

impl PerformanceSummary {
    /// Compute every statistic for a finished run.
    pub fn compute(result: &RunResult) -> Self {
        let trades = &result.trades;
        let wins = trades.iter().filter(|t| t.is_winner()).count();
        let losses = trades.len() - wins;
        let losing_trades = trades.iter().filter(|t| t.net_profit < 0.0).count();
        let gross_profit = gross_profit(trades);
        let gross_loss = gross_loss(trades);
        Self {
            trade_count: trades.len(),
            wins,
            losses,
            win_rate: win_rate(trades),
            gross_profit,
            gross_loss,
            net_profit: trades.iter().map(|t| t.net_profit).sum(),
            profit_factor: profit_factor(trades),
            average_win: if wins > 0 {
                gross_profit / wins as f64
            } else {
                0.0
            },
            average_loss: if losing_trades > 0 {
                gross_loss / losing_trades as f64
            } else {
                0.0
            },
            max_consecutive_wins: max_consecutive_wins(trades),
            max_consecutive_losses: max_consecutive_losses(trades),
            total_commission: result.commission_paid,
            initial_balance: result.initial_balance,
            final_balance: result.final_balance,
            total_return: total_return(result.initial_balance, result.final_equity()),
            peak_equity: result.peak_equity,
            max_drawdown: max_drawdown(result.initial_balance, &result.equity_curve),
            exit_reasons: exit_reason_counts(trades),
            monthly: monthly_buckets(trades),
            rejections: result.rejections.clone(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Fraction of trades with positive net profit.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Sum of positive net profits.
pub fn gross_profit(trades: &[TradeRecord]) -> f64 {
    trades
        .iter()
        .filter(|t| t.net_profit > 0.0)
        .map(|t| t.net_profit)
        .sum()
}

/// Sum of negative net profits, as a positive number.
pub fn gross_loss(trades: &[TradeRecord]) -> f64 {
    trades
        .iter()
        .filter(|t| t.net_profit < 0.0)
        .map(|t| t.net_profit.abs())
        .sum()
}

/// Profit factor: gross profit / gross loss.
///
/// `+inf` when nothing lost and something was won; `0` when neither.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    let profit = gross_profit(trades);
    let loss = gross_loss(trades);
    if loss == 0.0 {
        return if profit > 0.0 { f64::INFINITY } else { 0.0 };
    }
    profit / loss
}

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(initial_balance: f64, final_equity: f64) -> f64 {
    if initial_balance <= 0.0 {
        return 0.0;
    }
    (final_equity - initial_balance) / initial_balance
}

/// Maximum drawdown as a positive fraction (0.15 = 15% below the running peak).
///
/// The running peak starts at the initial balance. Returns 0.0 if equity
/// never falls below its peak.
pub fn max_drawdown(initial_balance: f64, equity_curve: &[EquitySnapshot]) -> f64 {
    let mut peak = initial_balance;
    let mut max_dd = 0.0_f64;

    for snapshot in equity_curve {
        let equity = snapshot.equity;
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            let dd = (peak - equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Maximum consecutive winning trades.
pub fn max_consecutive_wins(trades: &[TradeRecord]) -> usize {
    max_consecutive(trades, true)
}

/// Maximum consecutive losing (non-winning) trades.
pub fn max_consecutive_losses(trades: &[TradeRecord]) -> usize {
    max_consecutive(trades, false)
}

pub fn exit_reason_counts(trades: &[TradeRecord]) -> ExitReasonCounts {
    let mut counts = ExitReasonCounts::default();
    for trade in trades {
        match trade.exit_reason {
            ExitReason::TakeProfit => counts.take_profit += 1,
            ExitReason::StopLoss => counts.stop_loss += 1,
            ExitReason::Manual => counts.manual += 1,
        }
    }
    counts
}

/// Group trades by exit month, in calendar order.
pub fn monthly_buckets(trades: &[TradeRecord]) -> Vec<MonthlyBucket> {
    let mut months: BTreeMap<String, MonthlyBucket> = BTreeMap::new();
    for trade in trades {
        let month = trade.exit_month();
        let bucket = months.entry(month.clone()).or_insert_with(|| MonthlyBucket {
            month,
            trades: 0,
            wins: 0,
            win_rate: 0.0,
            profit: 0.0,
            pips: 0.0,
        });
        bucket.trades += 1;
        if trade.is_winner() {
            bucket.wins += 1;
        }
        bucket.profit += trade.net_profit;
        bucket.pips += trade.profit_in_pips;
    }
    months
        .into_values()
        .map(|mut bucket| {
            bucket.win_rate = bucket.wins as f64 / bucket.trades as f64;
            bucket
        })
        .collect()
}

// ─── Helpers ────────────────────────────────────────────────────────

fn max_consecutive(trades: &[TradeRecord], winners: bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;

    for trade in trades {
        if trade.is_winner() == winners {
            current += 1;
            if current > max_streak {
                max_streak = current;
            }
        } else {
            current = 0;
        }
    }
    max_streak
}

/// JSON has no infinity, so `+inf` round-trips as the string `"inf"`.
pub mod infinite_as_string {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if *value == f64::INFINITY {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) if text == "inf" => Ok(f64::INFINITY),
            Repr::Text(text) => Err(D::Error::custom(format!(
                "expected a number or \"inf\", got \"{text}\""
            ))),
        }
    }
}
