use chrono::NaiveDateTime;

use crate::domain::{EquitySnapshot, TradeRecord};

/// Balance, trade ledger and equity curve.
///
/// Both sequences are append-only. Commission is taken from the balance at
/// entry; gross profit is credited at close, so after every close the balance
/// equals `initial + Σ net_profit − commission on still-open positions`.
#[derive(Debug, Clone)]
pub struct Ledger {
    initial_balance: f64,
    balance: f64,
    commission_paid: f64,
    wins: u64,
    trades: Vec<TradeRecord>,
    equity_curve: Vec<EquitySnapshot>,
}

impl Ledger {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            commission_paid: 0.0,
            wins: 0,
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn charge_commission(&mut self, amount: f64) {
        self.balance -= amount;
        self.commission_paid += amount;
    }

    /// Credit a closed trade and append it to the ledger.
    pub fn book(&mut self, trade: TradeRecord) {
        self.balance += trade.profit_in_account_currency;
        if trade.is_winner() {
            self.wins += 1;
        }
        self.trades.push(trade);
    }

    /// Wins over closed trades, as a fraction. Zero before the first close.
    pub fn rolling_win_rate(&self) -> f64 {
        if self.trades.is_empty() {
            0.0
        } else {
            self.wins as f64 / self.trades.len() as f64
        }
    }

    /// Record equity at bar close
    pub fn record_snapshot(
        &mut self,
        timestamp: NaiveDateTime,
        unrealized_pnl: f64,
        open_positions: usize,
    ) -> &EquitySnapshot {
        let snapshot = EquitySnapshot {
            timestamp,
            balance: self.balance,
            unrealized_pnl,
            equity: self.balance + unrealized_pnl,
            open_positions,
            rolling_win_rate: self.rolling_win_rate(),
        };
        self.equity_curve.push(snapshot);
        &self.equity_curve[self.equity_curve.len() - 1]
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn commission_paid(&self) -> f64 {
        self.commission_paid
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquitySnapshot] {
        &self.equity_curve
    }

    pub fn into_parts(self) -> (Vec<TradeRecord>, Vec<EquitySnapshot>) {
        (self.trades, self.equity_curve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, ExitReason, PositionId};
    use chrono::NaiveDate;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn trade(gross: f64, commission: f64) -> TradeRecord {
        TradeRecord {
            position_id: PositionId(1),
            strategy_label: "t".into(),
            direction: Direction::Long,
            opened_at: ts(9),
            entry_price: 100.0,
            stop_price: 99.0,
            target_price: 101.0,
            size: 1.0,
            closed_at: ts(10),
            exit_price: 100.0,
            exit_reason: ExitReason::Manual,
            profit_in_price_units: 0.0,
            profit_in_pips: 0.0,
            profit_in_account_currency: gross,
            commission,
            net_profit: gross - commission,
        }
    }

    #[test]
    fn balance_reflects_net_profit() {
        let mut ledger = Ledger::new(1_000.0);
        ledger.charge_commission(2.0);
        ledger.book(trade(50.0, 2.0));
        assert_eq!(ledger.balance(), 1_048.0);
        assert_eq!(ledger.commission_paid(), 2.0);
    }

    #[test]
    fn win_rate_tracks_closed_trades() {
        let mut ledger = Ledger::new(1_000.0);
        assert_eq!(ledger.rolling_win_rate(), 0.0);
        ledger.book(trade(10.0, 0.0));
        ledger.book(trade(-10.0, 0.0));
        assert_eq!(ledger.rolling_win_rate(), 0.5);
    }

    #[test]
    fn snapshot_equity_identity() {
        let mut ledger = Ledger::new(1_000.0);
        let snap = ledger.record_snapshot(ts(9), 25.0, 1).clone();
        assert_eq!(snap.equity, snap.balance + snap.unrealized_pnl);
        assert_eq!(snap.equity, 1_025.0);
        assert_eq!(ledger.equity_curve().len(), 1);
    }
}
