//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! Provides three export formats for backtest results:
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: trade ledger, equity curve and rejection log
//! - **Markdown**: human-readable single-run report
//!
//! All persisted artifacts include a `schema_version` field. Newer versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tradesim_core::domain::{EquitySnapshot, TradeRecord};
use tradesim_core::engine::{RejectedSignal, RejectionReason};

use crate::runner::{short_id, BacktestResult, SCHEMA_VERSION};
use crate::sweep::SweepOutcome;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export the trade ledger as CSV, one row per closed position in close order.
///
/// Columns: position_id, strategy_label, direction, opened_at, entry_price,
/// stop_price, target_price, size, closed_at, exit_price, exit_reason,
/// profit_price_units, profit_pips, profit_account, commission, net_profit
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "position_id",
        "strategy_label",
        "direction",
        "opened_at",
        "entry_price",
        "stop_price",
        "target_price",
        "size",
        "closed_at",
        "exit_price",
        "exit_reason",
        "profit_price_units",
        "profit_pips",
        "profit_account",
        "commission",
        "net_profit",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.position_id.0.to_string(),
            &t.strategy_label,
            &t.direction.to_string(),
            &t.opened_at.format(TIMESTAMP_FORMAT).to_string(),
            &format!("{:.6}", t.entry_price),
            &format!("{:.6}", t.stop_price),
            &format!("{:.6}", t.target_price),
            &format!("{:.6}", t.size),
            &t.closed_at.format(TIMESTAMP_FORMAT).to_string(),
            &format!("{:.6}", t.exit_price),
            &t.exit_reason.to_string(),
            &format!("{:.6}", t.profit_in_price_units),
            &format!("{:.2}", t.profit_in_pips),
            &format!("{:.2}", t.profit_in_account_currency),
            &format!("{:.2}", t.commission),
            &format!("{:.2}", t.net_profit),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export the equity curve as CSV, one row per processed bar.
pub fn export_equity_csv(equity_curve: &[EquitySnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "timestamp",
        "balance",
        "unrealized_pnl",
        "equity",
        "open_positions",
        "rolling_win_rate",
    ])?;
    for s in equity_curve {
        wtr.write_record([
            &s.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            &format!("{:.2}", s.balance),
            &format!("{:.2}", s.unrealized_pnl),
            &format!("{:.2}", s.equity),
            &s.open_positions.to_string(),
            &format!("{:.4}", s.rolling_win_rate),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export every rejected signal with its reason.
pub fn export_rejections_csv(rejected: &[RejectedSignal]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["bar_index", "timestamp", "signal", "reason", "context"])?;
    for r in rejected {
        wtr.write_record([
            &r.bar_index.to_string(),
            &r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            &i8::from(r.signal).to_string(),
            &r.reason.to_string(),
            &r.context,
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per sweep point, in grid order.
pub fn export_sweep_csv(outcomes: &[SweepOutcome]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "max_positions",
        "spread",
        "tie_break",
        "trades",
        "win_rate",
        "profit_factor",
        "net_profit",
        "max_drawdown",
        "rejections",
        "output_digest",
    ])?;
    for o in outcomes {
        let s = &o.result.summary;
        wtr.write_record([
            &o.point.max_positions.to_string(),
            &format!("{}", o.point.spread),
            &o.point.tie_break.to_string(),
            &s.trade_count.to_string(),
            &format!("{:.4}", s.win_rate),
            &format_profit_factor(s.profit_factor),
            &format!("{:.2}", s.net_profit),
            &format!("{:.4}", s.max_drawdown),
            &s.rejections.total().to_string(),
            &o.result.output_digest,
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates a directory named `{name}_{run_id[..12]}/` under `output_dir`
/// containing:
/// - `manifest.json`: the full `BacktestResult`
/// - `trades.csv`: trade ledger
/// - `equity.csv`: bar-by-bar equity curve
/// - `rejections.csv`: every signal that was not admitted
/// - `report.md`: Markdown summary
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!("{}_{}", result.name, short_id(&result.run_id));
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write(&run_dir.join("manifest.json"), &export_json(result)?)?;
    write(&run_dir.join("trades.csv"), &export_trades_csv(&result.trades)?)?;
    write(&run_dir.join("equity.csv"), &export_equity_csv(&result.equity_curve)?)?;
    write(
        &run_dir.join("rejections.csv"),
        &export_rejections_csv(&result.rejected_signals)?,
    )?;
    write(&run_dir.join("report.md"), &generate_report(result))?;

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
///
/// Rejects unknown schema versions.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

// ─── Markdown report ────────────────────────────────────────────────

/// Generate a Markdown report for a single backtest run.
pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(2048);
    let s = &result.summary;

    md.push_str(&format!("# Backtest Report: {}\n\n", result.name));

    // Metadata
    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Run ID | {} |\n", short_id(&result.run_id)));
    if let (Some(first), Some(last)) = (result.equity_curve.first(), result.equity_curve.last()) {
        md.push_str(&format!(
            "| Period | {} to {} |\n",
            first.timestamp, last.timestamp
        ));
    }
    md.push_str(&format!(
        "| Bars | {} ({} void) |\n",
        result.bar_count, result.void_bars
    ));
    md.push_str(&format!("| Sizer | {} |\n", result.sizer));
    md.push_str(&format!(
        "| Max Positions | {} |\n",
        result.config.execution.max_positions
    ));
    md.push_str(&format!("| Spread | {} |\n", result.config.execution.spread));
    md.push_str(&format!("| Tie Break | {} |\n", result.config.execution.tie_break));
    md.push_str(&format!("| Dataset Hash | {} |\n", short_id(&result.dataset_hash)));
    md.push_str(&format!("| Output Digest | {} |\n", result.output_digest));
    if result.cancelled {
        md.push_str("| Status | **CANCELLED** |\n");
    }
    md.push('\n');

    // Performance Summary
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Initial Balance | {:.2} |\n", s.initial_balance));
    md.push_str(&format!("| Final Balance | {:.2} |\n", s.final_balance));
    md.push_str(&format!("| Net Profit | {:.2} |\n", s.net_profit));
    md.push_str(&format!(
        "| Total Return | {:.2}% |\n",
        s.total_return * 100.0
    ));
    md.push_str(&format!(
        "| Max Drawdown | {:.2}% |\n",
        s.max_drawdown * 100.0
    ));
    md.push_str(&format!("| Peak Equity | {:.2} |\n", s.peak_equity));
    md.push_str(&format!("| Trades | {} |\n", s.trade_count));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", s.win_rate * 100.0));
    md.push_str(&format!(
        "| Profit Factor | {} |\n",
        format_profit_factor(s.profit_factor)
    ));
    md.push_str(&format!("| Average Win | {:.2} |\n", s.average_win));
    md.push_str(&format!("| Average Loss | {:.2} |\n", s.average_loss));
    md.push_str(&format!(
        "| Max Consecutive Wins | {} |\n",
        s.max_consecutive_wins
    ));
    md.push_str(&format!(
        "| Max Consecutive Losses | {} |\n",
        s.max_consecutive_losses
    ));
    md.push_str(&format!("| Commission | {:.2} |\n", s.total_commission));
    md.push('\n');

    // Exits
    md.push_str("## Exit Reasons\n\n");
    md.push_str("| Reason | Count |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| TakeProfit | {} |\n", s.exit_reasons.take_profit));
    md.push_str(&format!("| StopLoss | {} |\n", s.exit_reasons.stop_loss));
    md.push_str(&format!("| Manual | {} |\n", s.exit_reasons.manual));
    md.push('\n');

    // Admission
    md.push_str("## Admission\n\n");
    md.push_str(&format!(
        "Signals seen: {}, opened: {}, rejected: {}, bars at capacity: {}\n\n",
        result.signals_seen,
        result.positions_opened,
        s.rejections.total(),
        result.capacity_saturated_bars
    ));
    md.push_str("| Reason | Count |\n");
    md.push_str("| --- | --- |\n");
    for reason in RejectionReason::ALL {
        md.push_str(&format!("| {} | {} |\n", reason, s.rejections.get(reason)));
    }
    md.push('\n');

    // Monthly
    if !s.monthly.is_empty() {
        md.push_str("## Monthly\n\n");
        md.push_str("| Month | Trades | Win Rate | Profit | Pips |\n");
        md.push_str("| --- | --- | --- | --- | --- |\n");
        for bucket in &s.monthly {
            md.push_str(&format!(
                "| {} | {} | {:.1}% | {:.2} | {:.1} |\n",
                bucket.month,
                bucket.trades,
                bucket.win_rate * 100.0,
                bucket.profit,
                bucket.pips
            ));
        }
        md.push('\n');
    }

    md
}

/// `inf` for an unbounded profit factor, two decimals otherwise.
pub fn format_profit_factor(value: f64) -> String {
    if value.is_infinite() {
        "inf".to_string()
    } else {
        format!("{value:.2}")
    }
}
