//! Bar-by-bar event loop: the heart of the simulator.
//!
//! Three phases per bar, always in this order:
//! 1. Exits: evaluate every open position against the bar, then close the
//!    decided set. A position is never closed by the bar that opened it.
//! 2. Admission: gate the bar's signal, size it, pay half the spread, open.
//! 3. Snapshot: mark open positions at the bar close and record equity.
//!
//! On the final bar (end of stream, or the bar that observes cancellation)
//! every still-open position is closed at that bar's close before the
//! snapshot, so the last snapshot is always flat.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::domain::{
    validate_levels, Bar, BarError, BarSeries, EntryRequest, ExitReason, NewPosition, Position,
    PositionError, PositionId, PositionStatus, Pricing, TradeRecord,
};
use crate::engine::accounting::Ledger;
use crate::engine::admission::{apply_spread, AdmissionController, RejectionCounters, RejectionReason};
use crate::engine::config::EngineConfig;
use crate::engine::error::EngineError;
use crate::engine::exit::evaluate_exits;
use crate::engine::risk::RiskState;
use crate::engine::state::{EngineState, RunResult};
use crate::sizers::{build_sizer, Sizer, SizingInput};

/// A single simulation. Owns all mutable state; nothing is shared between runs.
pub struct Engine {
    config: EngineConfig,
    pricing: Pricing,
    sizer: Box<dyn Sizer>,
    admission: AdmissionController,
    ledger: Ledger,
    state: EngineState,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let pricing = config.pricing();
        let sizer = build_sizer(&config.sizing, &pricing);
        let admission =
            AdmissionController::new(config.execution.max_positions, config.risk.clone());
        let ledger = Ledger::new(config.account.initial_balance);
        let state = EngineState::new(config.account.initial_balance);
        Ok(Self {
            config,
            pricing,
            sizer,
            admission,
            ledger,
            state,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open positions in insertion order.
    pub fn open_positions(&self) -> &[Position] {
        &self.state.open
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn risk(&self) -> &RiskState {
        &self.state.risk
    }

    pub fn rejections(&self) -> &RejectionCounters {
        self.admission.counters()
    }

    pub fn bars_processed(&self) -> usize {
        self.state.bar_index
    }

    /// Process one bar that is not the last of the stream.
    pub fn process_bar(&mut self, bar: &Bar) -> Result<(), EngineError> {
        self.step(bar, false)
    }

    /// Process the last bar, liquidate whatever is still open, and produce the result.
    pub fn finish(self, bar: &Bar) -> Result<RunResult, EngineError> {
        self.complete(bar, false)
    }

    /// Close an open position at `price` with reason `Manual`.
    ///
    /// Closing a position that was already closed surfaces
    /// [`PositionError::NotOpen`]; an id that was never issued is
    /// [`EngineError::UnknownPosition`]. `closed_at` may not precede the
    /// position's open, the last processed bar or an earlier manual close.
    pub fn close_position(
        &mut self,
        id: PositionId,
        closed_at: NaiveDateTime,
        price: f64,
    ) -> Result<TradeRecord, EngineError> {
        let Some(position) = self.state.open.iter().find(|p| p.id() == id) else {
            return Err(match self.ledger.trades().iter().find(|t| t.position_id == id) {
                Some(trade) => PositionError::NotOpen {
                    id,
                    status: PositionStatus::from(trade.exit_reason),
                }
                .into(),
                None => EngineError::UnknownPosition(id),
            });
        };

        let earliest = [self.state.last_timestamp, self.state.last_manual_close]
            .into_iter()
            .flatten()
            .fold(position.opened_at(), NaiveDateTime::max);
        if closed_at < earliest {
            return Err(EngineError::BackdatedClose {
                id,
                closed_at,
                earliest,
            });
        }

        let trade = self.close_by_id(id, closed_at, price, ExitReason::Manual)?;
        self.state.last_manual_close = Some(closed_at);
        self.refresh_risk();
        Ok(trade)
    }

    fn complete(mut self, bar: &Bar, cancelled: bool) -> Result<RunResult, EngineError> {
        self.step(bar, true)?;
        Ok(self.into_result(cancelled))
    }

    fn step(&mut self, bar: &Bar, is_final: bool) -> Result<(), EngineError> {
        if let Some(previous) = self.state.last_timestamp {
            if bar.timestamp <= previous {
                return Err(EngineError::OutOfOrderBar {
                    previous,
                    current: bar.timestamp,
                });
            }
        }
        if let Some(manual) = self.state.last_manual_close {
            if bar.timestamp < manual {
                return Err(EngineError::OutOfOrderBar {
                    previous: manual,
                    current: bar.timestamp,
                });
            }
        }
        let bar_index = self.state.bar_index;

        if bar.is_void() {
            self.state.void_bars += 1;
            warn!(
                bar_index,
                timestamp = %bar.timestamp,
                "void bar: exits skipped, equity carried forward"
            );
        } else {
            self.state.last_valid_close = Some(bar.close);
        }

        // ── Phase 1: exits ──
        let decisions = evaluate_exits(bar, &self.state.open, self.config.execution.tie_break);
        for decision in decisions {
            self.close_by_id(
                decision.position_id,
                bar.timestamp,
                decision.exit_price,
                decision.reason,
            )?;
        }

        // ── Phase 2: admission ──
        if self.state.open.len() >= self.config.execution.max_positions {
            self.state.capacity_saturated_bars += 1;
        }
        self.refresh_risk();
        if let Some(request) =
            self.admission
                .evaluate(bar, bar_index, self.state.open.len(), &self.state.risk)
        {
            self.try_open(bar, bar_index, request)?;
        }

        if is_final {
            self.liquidate(bar.timestamp)?;
        }

        // ── Phase 3: snapshot ──
        let unrealized = self.unrealized_pnl();
        let notional = self.open_notional();
        let equity = self
            .ledger
            .record_snapshot(bar.timestamp, unrealized, self.state.open.len())
            .equity;
        self.state.risk.refresh(equity, notional);

        self.state.last_timestamp = Some(bar.timestamp);
        self.state.bar_index += 1;
        Ok(())
    }

    fn try_open(
        &mut self,
        bar: &Bar,
        bar_index: usize,
        request: EntryRequest,
    ) -> Result<(), EngineError> {
        let entry_price = apply_spread(
            request.direction,
            request.reference_price,
            self.config.execution.spread,
        );
        if let Err(e) = validate_levels(
            request.direction,
            entry_price,
            request.stop_price,
            request.target_price,
        ) {
            self.admission
                .reject(bar, bar_index, RejectionReason::InvalidLevels, e.to_string());
            return Ok(());
        }

        let risk_adjustment = if self.config.sizing.risk_scaling {
            self.state.risk.size_adjustment(self.admission.limits())
        } else {
            1.0
        };
        let input = SizingInput {
            balance: self.ledger.balance(),
            explicit_size: request.explicit_size,
            signal_quality: request.signal_quality,
            volatility_ratio: request.volatility_ratio,
            stop_distance: (entry_price - request.stop_price).abs(),
            rolling_win_rate: self.ledger.rolling_win_rate(),
            risk_adjustment,
        };
        let size = self.sizer.size(&input);
        if !(size.is_finite() && size > 0.0) {
            let context = format!("sizer={} returned {size}", self.sizer.name());
            self.admission
                .reject(bar, bar_index, RejectionReason::ZeroSize, context);
            return Ok(());
        }

        let limit = self.config.execution.max_positions;
        if self.state.open.len() >= limit {
            return Err(EngineError::CapacityExceeded {
                open: self.state.open.len() + 1,
                limit,
            });
        }

        let id = self.state.id_gen.next_position_id();
        let position = Position::open(
            id,
            bar.timestamp,
            NewPosition {
                direction: request.direction,
                entry_price,
                stop_price: request.stop_price,
                target_price: request.target_price,
                size,
                strategy_label: request.strategy_label,
                commission: self.config.account.commission_per_size * size,
            },
        )?;
        self.ledger.charge_commission(position.commission());
        debug!(
            bar_index,
            %id,
            direction = %position.direction(),
            entry = entry_price,
            size,
            "position opened"
        );
        self.state.open.push(position);
        self.state.positions_opened += 1;
        Ok(())
    }

    fn close_by_id(
        &mut self,
        id: PositionId,
        closed_at: NaiveDateTime,
        price: f64,
        reason: ExitReason,
    ) -> Result<TradeRecord, EngineError> {
        let index = self
            .state
            .open
            .iter()
            .position(|p| p.id() == id)
            .ok_or(EngineError::UnknownPosition(id))?;
        let trade = self.state.open[index].close(closed_at, price, reason, &self.pricing)?;
        self.state.open.remove(index);
        self.state.risk.record_close(&trade);
        debug!(
            %id,
            %reason,
            exit = price,
            net_profit = trade.net_profit,
            "position closed"
        );
        self.ledger.book(trade.clone());
        Ok(trade)
    }

    fn liquidate(&mut self, closed_at: NaiveDateTime) -> Result<(), EngineError> {
        if self.state.open.is_empty() {
            return Ok(());
        }
        let price = self.state.last_valid_close.ok_or(EngineError::NoMarkPrice)?;
        let ids: Vec<PositionId> = self.state.open.iter().map(Position::id).collect();
        info!(count = ids.len(), price, "liquidating open positions");
        for id in ids {
            self.close_by_id(id, closed_at, price, ExitReason::Manual)?;
        }
        Ok(())
    }

    fn unrealized_pnl(&self) -> f64 {
        let Some(mark) = self.state.last_valid_close else {
            return 0.0;
        };
        self.state
            .open
            .iter()
            .map(|p| p.unrealized_pnl(mark, &self.pricing))
            .sum()
    }

    fn open_notional(&self) -> f64 {
        let Some(mark) = self.state.last_valid_close else {
            return 0.0;
        };
        self.state
            .open
            .iter()
            .map(|p| self.pricing.notional(p.size(), mark))
            .sum()
    }

    fn refresh_risk(&mut self) {
        let equity = self.ledger.balance() + self.unrealized_pnl();
        let notional = self.open_notional();
        self.state.risk.refresh(equity, notional);
    }

    fn into_result(self, cancelled: bool) -> RunResult {
        let initial_balance = self.ledger.initial_balance();
        let final_balance = self.ledger.balance();
        let commission_paid = self.ledger.commission_paid();
        let sizer = self.sizer.name().to_string();
        let (trades, equity_curve) = self.ledger.into_parts();
        let (rejections, rejected_signals, signals_seen) = self.admission.into_parts();

        if self.state.void_bars > 0 {
            warn!(
                void_bars = self.state.void_bars,
                bars = self.state.bar_index,
                "stream contained void bars"
            );
        }

        RunResult {
            trades,
            equity_curve,
            rejections,
            rejected_signals,
            initial_balance,
            final_balance,
            commission_paid,
            peak_equity: self.state.risk.peak_equity,
            bars_processed: self.state.bar_index,
            void_bars: self.state.void_bars,
            signals_seen,
            positions_opened: self.state.positions_opened,
            capacity_saturated_bars: self.state.capacity_saturated_bars,
            cancelled,
            sizer,
        }
    }
}

/// Run a full simulation over a validated bar series.
///
/// `cancel` is checked before every bar. The bar that observes the request is
/// processed as the final bar: open positions are liquidated at its close and
/// the partial result is returned with `cancelled = true`.
pub fn run_backtest(
    series: &BarSeries,
    config: &EngineConfig,
    cancel: Option<&AtomicBool>,
) -> Result<RunResult, EngineError> {
    let mut engine = Engine::new(config.clone())?;
    let (last, body) = series.bars().split_last().ok_or(BarError::Empty)?;
    info!(
        bars = series.len(),
        sizer = engine.sizer.name(),
        max_positions = config.execution.max_positions,
        "starting simulation"
    );

    let cancelled = || cancel.is_some_and(|f| f.load(Ordering::Relaxed));
    for bar in body {
        if cancelled() {
            warn!(
                bar_index = engine.bars_processed(),
                "cancellation requested, liquidating"
            );
            let result = engine.complete(bar, true)?;
            log_summary(&result);
            return Ok(result);
        }
        engine.process_bar(bar)?;
    }

    let result = engine.complete(last, cancelled())?;
    log_summary(&result);
    Ok(result)
}

fn log_summary(result: &RunResult) {
    info!(
        trades = result.trades.len(),
        rejections = result.rejections.total(),
        final_balance = result.final_balance,
        cancelled = result.cancelled,
        "simulation complete"
    );
}
