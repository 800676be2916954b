//! End-to-end engine scenarios: exits, capacity, tie-breaks, sizing,
//! liquidation, cancellation, void bars and risk breakers.

use std::sync::atomic::AtomicBool;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tradesim_core::domain::{Bar, BarSeries, Direction, ExitReason, Signal};
use tradesim_core::engine::{
    run_backtest, Engine, EngineConfig, EngineError, RejectionReason, RunResult, SizerMode,
    TieBreakPolicy,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn ts(i: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::hours(i)
}

fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar::new(ts(i), open, high, low, close)
}

fn quiet(i: i64, price: f64) -> Bar {
    bar(i, price, price + 0.01, price - 0.01, price)
}

fn config(max_positions: usize) -> EngineConfig {
    let mut config = EngineConfig::new(1_000_000.0, max_positions);
    config.execution.spread = 0.0;
    config.sizing.max_risk_fraction = None;
    config
}

fn run(bars: Vec<Bar>, config: &EngineConfig) -> RunResult {
    let series = BarSeries::new(bars).unwrap();
    run_backtest(&series, config, None).unwrap()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

fn assert_consistent(result: &RunResult, bars: usize) {
    assert_eq!(result.equity_curve.len(), bars);
    assert_eq!(result.bars_processed, bars);
    assert_eq!(result.equity_curve.last().unwrap().open_positions, 0);
    let net: f64 = result.trades.iter().map(|t| t.net_profit).sum();
    assert_close(result.final_balance, result.initial_balance + net);
    assert_close(result.final_equity(), result.final_balance);
    assert_eq!(result.positions_opened as usize, result.trades.len());
    assert_eq!(
        result.signals_seen,
        result.positions_opened + result.rejections.total()
    );
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn take_profit_then_capacity_frees() {
    let bars = vec![
        bar(0, 100.0, 100.05, 99.95, 100.0).with_signal(Signal::Long, 99.90, 100.20),
        bar(1, 100.0, 100.25, 99.95, 100.15),
        bar(2, 100.15, 100.2, 100.1, 100.15).with_signal(Signal::Long, 100.0, 100.4),
    ];
    let result = run(bars, &config(1));

    assert_eq!(result.trades.len(), 2);
    let first = &result.trades[0];
    assert_eq!(first.exit_reason, ExitReason::TakeProfit);
    assert_eq!(first.exit_price, 100.20);
    assert_eq!(first.closed_at, ts(1));
    assert_close(first.profit_in_price_units, 0.20);
    assert_close(first.profit_in_account_currency, 200.0);
    assert_close(first.profit_in_pips, 20.0);

    // Capacity freed on bar 1 lets bar 2 open; the end of stream closes it.
    let second = &result.trades[1];
    assert_eq!(second.opened_at, ts(2));
    assert_eq!(second.exit_reason, ExitReason::Manual);
    assert_eq!(result.rejections.capacity, 0);
    assert_consistent(&result, 3);
}

#[test]
fn third_signal_rejected_at_capacity() {
    let bars = vec![
        quiet(0, 100.0).with_signal(Signal::Long, 90.0, 110.0),
        quiet(1, 100.0).with_signal(Signal::Long, 90.0, 110.0),
        quiet(2, 100.0).with_signal(Signal::Long, 90.0, 110.0),
        quiet(3, 100.0),
    ];
    let result = run(bars, &config(2));

    assert_eq!(result.positions_opened, 2);
    assert_eq!(result.rejections.capacity, 1);
    assert_eq!(result.rejected_signals.len(), 1);
    assert_eq!(result.rejected_signals[0].bar_index, 2);
    assert_eq!(result.rejected_signals[0].reason, RejectionReason::Capacity);
    assert_eq!(result.capacity_saturated_bars, 2);
    assert!(result.equity_curve.iter().all(|s| s.open_positions <= 2));
    assert_consistent(&result, 4);
}

#[test]
fn gap_through_bar_closes_exactly_once() {
    let bars = || {
        vec![
            bar(0, 100.0, 100.05, 99.95, 100.0).with_signal(Signal::Long, 99.90, 100.20),
            bar(1, 100.0, 100.30, 99.80, 100.0),
            quiet(2, 100.0),
        ]
    };

    let conservative = run(bars(), &config(1));
    assert_eq!(conservative.trades.len(), 1);
    assert_eq!(conservative.trades[0].exit_reason, ExitReason::StopLoss);
    assert_eq!(conservative.trades[0].exit_price, 99.90);

    let mut optimistic_config = config(1);
    optimistic_config.execution.tie_break = TieBreakPolicy::TakeProfitFirst;
    let optimistic = run(bars(), &optimistic_config);
    assert_eq!(optimistic.trades.len(), 1);
    assert_eq!(optimistic.trades[0].exit_reason, ExitReason::TakeProfit);
}

#[test]
fn escalation_follows_win_rate_and_is_not_sticky() {
    let bars = vec![
        bar(0, 100.0, 100.05, 99.95, 100.0).with_signal(Signal::Long, 99.9, 100.2),
        // Take profit: win rate 100%.
        bar(1, 100.0, 100.25, 99.95, 100.2),
        bar(2, 100.2, 100.25, 100.15, 100.2).with_signal(Signal::Long, 100.1, 100.4),
        // Stop loss: win rate 50%.
        bar(3, 100.2, 100.22, 100.05, 100.1),
        bar(4, 100.1, 100.15, 100.05, 100.1).with_signal(Signal::Long, 100.0, 100.3),
        quiet(5, 100.1),
    ];
    let result = run(bars, &config(1));

    let sizes: Vec<f64> = result.trades.iter().map(|t| t.size).collect();
    assert_eq!(sizes, vec![0.01, 0.02, 0.01]);
    assert_eq!(result.trades[1].exit_reason, ExitReason::StopLoss);
    assert_consistent(&result, 6);
}

#[test]
fn explicit_size_and_dynamic_refinement() {
    let mut cfg = config(2);
    cfg.sizing.mode = SizerMode::Dynamic;
    let bars = vec![
        quiet(0, 100.0)
            .with_signal(Signal::Long, 99.0, 101.0)
            .with_explicit_size(0.1)
            .with_quality(3, 0.5),
        quiet(1, 100.0).with_signal(Signal::Short, 101.0, 99.0),
        quiet(2, 100.0),
    ];
    let result = run(bars, &cfg);
    assert_eq!(result.sizer, "Dynamic");
    // 0.1 × 1.5 × 1.5
    assert_close(result.trades[0].size, 0.225);
    assert_eq!(result.trades[1].direction, Direction::Short);
    assert_close(result.trades[1].size, 0.01);
}

#[test]
fn risk_ceiling_caps_size() {
    let mut cfg = config(1);
    cfg.sizing.max_risk_fraction = Some(0.001);
    let bars = vec![
        quiet(0, 100.0)
            .with_signal(Signal::Long, 99.0, 101.0)
            .with_explicit_size(5.0),
        quiet(1, 100.0),
    ];
    let result = run(bars, &cfg);
    // 1_000_000 × 0.001 / (1.0 × 100_000)
    assert_close(result.trades[0].size, 0.01);
}

#[test]
fn spread_moves_entry_against_the_trader() {
    let mut cfg = config(2);
    cfg.execution.spread = 0.02;
    let bars = vec![
        quiet(0, 100.0).with_signal(Signal::Long, 99.0, 101.0),
        quiet(1, 100.0).with_signal(Signal::Short, 101.0, 99.0),
        quiet(2, 100.0),
    ];
    let result = run(bars, &cfg);
    assert_close(result.trades[0].entry_price, 100.01);
    assert_close(result.trades[1].entry_price, 99.99);
    // Both pay half the spread when liquidated at the close.
    assert!(result.trades.iter().all(|t| t.net_profit < 0.0));
}

#[test]
fn entry_annotation_is_the_reference_price() {
    let bars = vec![
        quiet(0, 100.0)
            .with_signal(Signal::Long, 99.0, 101.0)
            .with_entry_price(99.5),
        quiet(1, 100.0),
    ];
    let result = run(bars, &config(1));
    assert_eq!(result.trades[0].entry_price, 99.5);
}

#[test]
fn end_of_stream_liquidates_everything() {
    let bars = vec![
        quiet(0, 100.0).with_signal(Signal::Long, 99.0, 101.0),
        quiet(1, 100.1).with_signal(Signal::Short, 101.0, 99.0),
        quiet(2, 100.3),
    ];
    let result = run(bars, &config(5));
    assert_eq!(result.trades.len(), 2);
    for trade in &result.trades {
        assert_eq!(trade.exit_reason, ExitReason::Manual);
        assert_eq!(trade.exit_price, 100.3);
        assert_eq!(trade.closed_at, ts(2));
    }
    assert!(!result.cancelled);
    assert_consistent(&result, 3);
}

#[test]
fn cancellation_liquidates_on_the_observing_bar() {
    let bars = vec![
        quiet(0, 100.0).with_signal(Signal::Long, 99.0, 101.0),
        quiet(1, 100.5),
        quiet(2, 101.0),
    ];
    let series = BarSeries::new(bars).unwrap();
    let cancel = AtomicBool::new(true);
    let result = run_backtest(&series, &config(1), Some(&cancel)).unwrap();

    assert!(result.cancelled);
    assert_eq!(result.bars_processed, 1);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::Manual);
    assert_consistent(&result, 1);
}

#[test]
fn cancellation_is_seen_on_a_single_bar_stream() {
    let series = BarSeries::new(vec![quiet(0, 100.0).with_signal(Signal::Long, 99.0, 101.0)]).unwrap();
    let cancel = AtomicBool::new(true);
    let result = run_backtest(&series, &config(1), Some(&cancel)).unwrap();

    assert!(result.cancelled);
    assert_eq!(result.trades.len(), 1);
    assert_consistent(&result, 1);

    let uncancelled = run_backtest(&series, &config(1), Some(&AtomicBool::new(false))).unwrap();
    assert!(!uncancelled.cancelled);
}

#[test]
fn manual_close_keeps_ledger_chronological() {
    let mut engine = Engine::new(config(1)).unwrap();
    engine.process_bar(&quiet(0, 100.0)).unwrap();
    engine
        .process_bar(&quiet(5, 100.0).with_signal(Signal::Long, 99.0, 101.0))
        .unwrap();
    let id = engine.open_positions()[0].id();

    let err = engine.close_position(id, ts(0), 100.1).unwrap_err();
    assert!(matches!(err, EngineError::BackdatedClose { .. }));
    assert_eq!(engine.open_positions().len(), 1);

    let trade = engine.close_position(id, ts(6), 100.1).unwrap();
    assert!(trade.closed_at >= trade.opened_at);
    assert!(engine.process_bar(&quiet(5, 100.0)).is_err());

    let result = engine.finish(&quiet(7, 100.0)).unwrap();
    assert!(result
        .trades
        .windows(2)
        .all(|pair| pair[0].closed_at <= pair[1].closed_at));
}

#[test]
fn non_positive_balance_sizes_to_zero_and_is_rejected() {
    let mut cfg = EngineConfig::new(1_000.0, 1);
    cfg.execution.spread = 0.0;
    cfg.sizing.max_risk_fraction = None;
    let bars = vec![
        bar(0, 100.0, 100.05, 99.95, 100.0)
            .with_signal(Signal::Long, 99.9, 100.2)
            .with_explicit_size(1.0),
        // Stop out: −0.1 × 100_000 leaves the balance at −9_000.
        bar(1, 100.0, 100.0, 99.85, 99.9),
        quiet(2, 99.9).with_signal(Signal::Long, 99.5, 100.5),
        quiet(3, 99.9),
    ];
    let result = run(bars, &cfg);

    assert_close(result.trades[0].net_profit, -10_000.0);
    assert_eq!(result.rejections.zero_size, 1);
    assert_eq!(result.rejected_signals[0].reason, RejectionReason::ZeroSize);
    assert_eq!(result.rejected_signals[0].bar_index, 2);
    assert_eq!(result.positions_opened, 1);
    assert_eq!(result.equity_curve[2].open_positions, 0);
    assert_close(result.final_balance, -9_000.0);
    assert_consistent(&result, 4);
}

#[test]
fn void_bar_skips_exits_and_carries_equity() {
    let void = bar(1, f64::NAN, 200.0, 0.0, f64::NAN).with_signal(Signal::Long, 90.0, 110.0);
    let bars = vec![
        quiet(0, 100.0).with_signal(Signal::Long, 99.9, 100.2),
        void,
        quiet(2, 100.05),
    ];
    let result = run(bars, &config(2));

    assert_eq!(result.void_bars, 1);
    assert_eq!(result.rejections.malformed_signal, 1);
    let snapshot = &result.equity_curve[1];
    assert_eq!(snapshot.open_positions, 1);
    assert_close(snapshot.equity, 1_000_000.0);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::Manual);
    assert_consistent(&result, 3);
}

#[test]
fn malformed_signal_is_counted_and_run_continues() {
    let mut missing_stop = quiet(0, 100.0);
    missing_stop.signal = Signal::Long;
    missing_stop.target_price = Some(101.0);
    let bars = vec![
        missing_stop,
        quiet(1, 100.0).with_signal(Signal::Long, 99.0, 101.0),
        quiet(2, 100.0),
    ];
    let result = run(bars, &config(1));
    assert_eq!(result.rejections.malformed_signal, 1);
    assert_eq!(result.positions_opened, 1);
    assert_consistent(&result, 3);
}

#[test]
fn consecutive_loss_breaker_blocks_entries() {
    let mut cfg = config(1);
    cfg.risk.max_consecutive_losses = Some(1);
    let bars = vec![
        bar(0, 100.0, 100.05, 99.95, 100.0).with_signal(Signal::Long, 99.9, 100.2),
        bar(1, 100.0, 100.0, 99.85, 99.9),
        quiet(2, 99.9).with_signal(Signal::Long, 99.5, 100.5),
        quiet(3, 99.9),
    ];
    let result = run(bars, &cfg);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.rejections.consecutive_losses, 1);
    assert_consistent(&result, 4);
}

#[test]
fn drawdown_breaker_blocks_entries() {
    let mut cfg = config(2);
    cfg.risk.max_drawdown_pct = Some(10.0);
    let bars = vec![
        quiet(0, 100.0)
            .with_signal(Signal::Long, 99.0, 101.0)
            .with_explicit_size(10.0),
        // Marked at 99.5: −500_000 unrealized, 50% below peak.
        bar(1, 99.6, 99.6, 99.4, 99.5).with_signal(Signal::Long, 99.0, 100.0),
        quiet(2, 99.5),
    ];
    let result = run(bars, &cfg);
    assert_eq!(result.rejections.max_drawdown, 1);
    assert_eq!(result.positions_opened, 1);
    assert_consistent(&result, 3);
}

#[test]
fn exposure_breaker_blocks_entries() {
    let mut cfg = config(5);
    cfg.risk.max_exposure_pct = Some(15.0);
    // Each position holds 0.01 × 100_000 × 100 = 100_000 notional, 10% of equity.
    let bars = vec![
        quiet(0, 100.0).with_signal(Signal::Long, 99.0, 101.0),
        quiet(1, 100.0).with_signal(Signal::Long, 99.0, 101.0),
        quiet(2, 100.0).with_signal(Signal::Long, 99.0, 101.0),
        quiet(3, 100.0),
    ];
    let result = run(bars, &cfg);
    assert_eq!(result.positions_opened, 2);
    assert_eq!(result.rejections.max_exposure, 1);
    assert_consistent(&result, 4);
}

#[test]
fn commission_is_deducted_from_net_profit() {
    let mut cfg = config(1);
    cfg.account.commission_per_size = 1_000.0;
    let bars = vec![
        bar(0, 100.0, 100.05, 99.95, 100.0).with_signal(Signal::Long, 99.9, 100.2),
        bar(1, 100.0, 100.25, 99.95, 100.15),
    ];
    let result = run(bars, &cfg);
    let trade = &result.trades[0];
    assert_close(trade.commission, 10.0);
    assert_close(trade.net_profit, 190.0);
    assert_close(result.commission_paid, 10.0);
    assert_consistent(&result, 2);
}

#[test]
fn runs_are_deterministic() {
    let bars: Vec<Bar> = (0..40)
        .map(|i| {
            let close = 100.0 + ((i as f64) * 0.7).sin() * 0.3;
            let b = bar(i, close, close + 0.12, close - 0.12, close);
            match i % 4 {
                0 => b.with_signal(Signal::Long, close - 0.1, close + 0.15),
                2 => b.with_signal(Signal::Short, close + 0.1, close - 0.15),
                _ => b,
            }
        })
        .collect();
    let a = run(bars.clone(), &config(3));
    let b = run(bars, &config(3));
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a.trades).unwrap(),
        serde_json::to_string(&b.trades).unwrap()
    );
}

#[test]
fn invalid_config_fails_before_running() {
    let series = BarSeries::new(vec![quiet(0, 100.0)]).unwrap();
    let mut cfg = config(1);
    cfg.execution.spread = f64::NAN;
    assert!(run_backtest(&series, &cfg, None).is_err());
}
