use genesis_types::{Action, EquitySnapshot, Side, Trade};
use tracing::debug;

use crate::htf_exit::ExitContext;

/// An open position. `quantity` is in asset units; entry price already
/// includes slippage.
#[derive(Debug, Clone)]
pub struct Position {
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_ts: i64,
    pub entry_bar: usize,
    pub commission_paid: f64,
    pub entry_reasons: Vec<String>,
    /// HTF exit targets frozen at open time; refreshed only by explicit
    /// swing-update policies.
    pub exit_context: Option<ExitContext>,
    /// Best price seen in the trade's favour, for trailing stops.
    pub peak_favorable: f64,
    pub trail_stop: Option<f64>,
}

impl Position {
    pub fn notional(&self) -> f64 {
        self.quantity * self.entry_price
    }

    fn unrealized(&self, mark: f64) -> f64 {
        (mark - self.entry_price) * self.quantity * self.side.sign()
    }
}

/// Single-position tracker: fills with slippage and commission, partial
/// closes, equity curve, drawdown. Owns all position and equity state for
/// one backtest; never shared across threads.
pub struct PositionTracker {
    initial_capital: f64,
    capital: f64,
    commission_rate: f64,
    slippage_rate: f64,
    position: Option<Position>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquitySnapshot>,
    peak_equity: f64,
    total_commission: f64,
    scale_in: bool,
}

impl PositionTracker {
    pub fn new(initial_capital: f64, commission_rate: f64, slippage_rate: f64) -> Self {
        Self {
            initial_capital,
            capital: initial_capital,
            commission_rate,
            slippage_rate,
            position: None,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            peak_equity: initial_capital,
            total_commission: 0.0,
            scale_in: false,
        }
    }

    /// Allow same-side signals to add to an open position instead of being
    /// ignored.
    pub fn with_scale_in(mut self, enabled: bool) -> Self {
        self.scale_in = enabled;
        self
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn position_mut(&mut self) -> Option<&mut Position> {
        self.position.as_mut()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquitySnapshot] {
        &self.equity_curve
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Realized capital plus unrealized PnL at the mark.
    pub fn equity(&self, mark: f64) -> f64 {
        let unrealized = self
            .position
            .as_ref()
            .map(|p| p.unrealized(mark))
            .unwrap_or(0.0);
        self.capital + unrealized
    }

    /// Entry fill price: slippage pushes the fill against the taker.
    fn entry_fill(&self, price: f64, side: Side) -> f64 {
        match side {
            Side::Long => price * (1.0 + self.slippage_rate),
            Side::Short => price * (1.0 - self.slippage_rate),
        }
    }

    /// Exit fill price: slippage again works against the taker.
    fn exit_fill(&self, price: f64, side: Side) -> f64 {
        match side {
            Side::Long => price * (1.0 - self.slippage_rate),
            Side::Short => price * (1.0 + self.slippage_rate),
        }
    }

    /// Execute a non-NONE decision: close an opposite position first, ignore
    /// a same-side signal, open otherwise. `size` is notional in quote
    /// currency.
    pub fn execute(
        &mut self,
        action: Action,
        size: f64,
        price: f64,
        ts: i64,
        bar: usize,
        reasons: Vec<String>,
    ) -> bool {
        let Some(side) = action.side() else {
            return false;
        };
        if size <= 0.0 {
            return false;
        }

        if let Some(pos) = &self.position {
            if pos.side == side {
                if !self.scale_in {
                    // Default policy: ignore same-side signals while open.
                    return false;
                }
                return self.scale_into(size, price);
            }
            self.close_full(price, ts, "opposite_signal");
        }

        let fill = self.entry_fill(price, side);
        let quantity = size / fill;
        let commission = size * self.commission_rate;
        self.capital -= commission;
        self.total_commission += commission;

        debug!(
            side = ?side,
            fill,
            notional = size,
            commission,
            "position open"
        );

        self.position = Some(Position {
            side,
            quantity,
            entry_price: fill,
            entry_ts: ts,
            entry_bar: bar,
            commission_paid: commission,
            entry_reasons: reasons,
            exit_context: None,
            peak_favorable: fill,
            trail_stop: None,
        });
        true
    }

    /// Add to the open position at the current price; the entry price
    /// becomes the size-weighted average.
    fn scale_into(&mut self, size: f64, price: f64) -> bool {
        let commission_rate = self.commission_rate;
        let slippage_rate = self.slippage_rate;
        let Some(pos) = self.position.as_mut() else {
            return false;
        };
        let fill = match pos.side {
            Side::Long => price * (1.0 + slippage_rate),
            Side::Short => price * (1.0 - slippage_rate),
        };
        let added_qty = size / fill;
        let commission = size * commission_rate;
        pos.entry_price = (pos.entry_price * pos.quantity + fill * added_qty)
            / (pos.quantity + added_qty);
        pos.quantity += added_qty;
        pos.commission_paid += commission;
        self.capital -= commission;
        self.total_commission += commission;
        debug!(fill, notional = size, "scaled into position");
        true
    }

    /// Close a fraction `f` in (0, 1] of the open position at `price`. The
    /// remainder keeps its entry price and context.
    pub fn close_partial(&mut self, fraction: f64, price: f64, ts: i64, reason: &str) {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction <= 0.0 {
            return;
        }
        if fraction >= 1.0 {
            self.close_full(price, ts, reason);
            return;
        }
        let Some(pos) = &mut self.position else {
            return;
        };

        let close_qty = pos.quantity * fraction;
        let side = pos.side;
        let fill = match side {
            Side::Long => price * (1.0 - self.slippage_rate),
            Side::Short => price * (1.0 + self.slippage_rate),
        };
        let price_pnl = (fill - pos.entry_price) * close_qty * side.sign();
        let exit_commission = fill * close_qty * self.commission_rate;
        // Entry commission attributed pro-rata to the closed slice.
        let entry_commission = pos.commission_paid * fraction;
        pos.commission_paid -= entry_commission;

        self.capital += price_pnl - exit_commission;
        self.total_commission += exit_commission;

        let trade = Trade {
            side,
            size: close_qty,
            entry_price: pos.entry_price,
            exit_price: fill,
            entry_ts: pos.entry_ts,
            exit_ts: ts,
            pnl: price_pnl - exit_commission - entry_commission,
            commission: exit_commission + entry_commission,
            entry_reasons: pos.entry_reasons.clone(),
            exit_reason: reason.to_string(),
        };
        pos.quantity -= close_qty;
        debug!(reason, fraction, pnl = trade.pnl, "partial close");
        self.trades.push(trade);
    }

    /// Close the whole position at `price`.
    pub fn close_full(&mut self, price: f64, ts: i64, reason: &str) {
        let Some(pos) = self.position.take() else {
            return;
        };

        let fill = self.exit_fill(price, pos.side);
        let price_pnl = (fill - pos.entry_price) * pos.quantity * pos.side.sign();
        let exit_commission = fill * pos.quantity * self.commission_rate;

        self.capital += price_pnl - exit_commission;
        self.total_commission += exit_commission;

        let trade = Trade {
            side: pos.side,
            size: pos.quantity,
            entry_price: pos.entry_price,
            exit_price: fill,
            entry_ts: pos.entry_ts,
            exit_ts: ts,
            pnl: price_pnl - exit_commission - pos.commission_paid,
            commission: exit_commission + pos.commission_paid,
            entry_reasons: pos.entry_reasons,
            exit_reason: reason.to_string(),
        };
        debug!(reason, pnl = trade.pnl, "position closed");
        self.trades.push(trade);
    }

    /// Mark-to-market at the bar close: update the peak-favorable price,
    /// append an equity snapshot, and return it.
    pub fn mark(&mut self, ts: i64, price: f64) -> EquitySnapshot {
        if let Some(pos) = &mut self.position {
            match pos.side {
                Side::Long => pos.peak_favorable = pos.peak_favorable.max(price),
                Side::Short => pos.peak_favorable = pos.peak_favorable.min(price),
            }
        }

        let equity = self.equity(price);
        self.peak_equity = self.peak_equity.max(equity);
        let drawdown_pct = if self.peak_equity > 0.0 {
            (self.peak_equity - equity) / self.peak_equity * 100.0
        } else {
            0.0
        };
        let unrealized = self
            .position
            .as_ref()
            .map(|p| p.unrealized(price))
            .unwrap_or(0.0);

        let snapshot = EquitySnapshot {
            ts,
            equity,
            unrealized_pnl: unrealized,
            drawdown_pct,
        };
        self.equity_curve.push(snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tracker_tests {
    use super::*;

    fn tracker() -> PositionTracker {
        // 0.2% commission, 0.05% slippage: the S2 reference costs.
        PositionTracker::new(10_000.0, 0.002, 0.0005)
    }

    #[test]
    fn open_applies_slippage_and_commission() {
        let mut t = tracker();
        assert!(t.execute(Action::Long, 200.0, 100.0, 1_000, 0, vec![]));
        let pos = t.position().unwrap();
        assert!((pos.entry_price - 100.05).abs() < 1e-9);
        assert!((pos.commission_paid - 0.4).abs() < 1e-9);
        // Equity right after open reflects slippage + commission drag.
        assert!(t.equity(100.0) < 10_000.0);
    }

    #[test]
    fn round_trip_at_flat_price_costs_twice_commission_plus_slippage() {
        let mut t = tracker();
        let notional = 200.0;
        t.execute(Action::Long, notional, 100.0, 1_000, 0, vec![]);
        t.close_full(100.0, 2_000, "test");

        assert_eq!(t.trades().len(), 1);
        let trade = &t.trades()[0];
        // PnL ~= -2 * (commission + slippage) * notional.
        let expected = -2.0 * (0.002 + 0.0005) * notional;
        assert!(
            (trade.pnl - expected).abs() < notional * 2e-4,
            "pnl {} vs expected {}",
            trade.pnl,
            expected
        );
        assert!(t.position().is_none());
    }

    #[test]
    fn short_profits_when_price_falls() {
        let mut t = tracker();
        t.execute(Action::Short, 1_000.0, 100.0, 1_000, 0, vec![]);
        t.close_full(90.0, 2_000, "take_profit");
        let trade = &t.trades()[0];
        assert_eq!(trade.side, Side::Short);
        assert!(trade.pnl > 90.0, "short pnl {} should be near +100", trade.pnl);
    }

    #[test]
    fn partial_close_keeps_entry_price_and_reduces_size() {
        let mut t = tracker();
        t.execute(Action::Long, 1_000.0, 100.0, 1_000, 0, vec![]);
        let qty_before = t.position().unwrap().quantity;

        t.close_partial(0.4, 110.0, 2_000, "fib_0.618");
        let pos = t.position().unwrap();
        assert!((pos.quantity - qty_before * 0.6).abs() < 1e-12);
        assert!((pos.entry_price - 100.05).abs() < 1e-9);
        assert_eq!(t.trades().len(), 1);
        assert!(t.trades()[0].pnl > 0.0);

        t.close_full(110.0, 3_000, "fib_0.786");
        assert_eq!(t.trades().len(), 2);
        assert!(t.position().is_none());
    }

    #[test]
    fn partial_segments_sum_to_full_close_pnl() {
        // Two segments at the same exit price must equal one full close.
        let mut a = tracker();
        a.execute(Action::Long, 1_000.0, 100.0, 1_000, 0, vec![]);
        a.close_partial(0.5, 110.0, 2_000, "p1");
        a.close_full(110.0, 2_000, "p2");
        let split: f64 = a.trades().iter().map(|t| t.pnl).sum();

        let mut b = tracker();
        b.execute(Action::Long, 1_000.0, 100.0, 1_000, 0, vec![]);
        b.close_full(110.0, 2_000, "full");
        let whole: f64 = b.trades().iter().map(|t| t.pnl).sum();

        assert!((split - whole).abs() < 1e-9, "{split} vs {whole}");
    }

    #[test]
    fn opposite_signal_closes_then_opens() {
        let mut t = tracker();
        t.execute(Action::Long, 1_000.0, 100.0, 1_000, 0, vec![]);
        t.execute(Action::Short, 1_000.0, 105.0, 2_000, 1, vec![]);
        assert_eq!(t.trades().len(), 1);
        assert_eq!(t.trades()[0].exit_reason, "opposite_signal");
        assert_eq!(t.position().unwrap().side, Side::Short);
    }

    #[test]
    fn same_side_signal_is_ignored() {
        let mut t = tracker();
        t.execute(Action::Long, 1_000.0, 100.0, 1_000, 0, vec![]);
        let qty = t.position().unwrap().quantity;
        assert!(!t.execute(Action::Long, 1_000.0, 101.0, 2_000, 1, vec![]));
        assert!((t.position().unwrap().quantity - qty).abs() < 1e-12);
    }

    #[test]
    fn scale_in_averages_entry_price() {
        let mut t = PositionTracker::new(10_000.0, 0.0, 0.0).with_scale_in(true);
        t.execute(Action::Long, 1_000.0, 100.0, 1_000, 0, vec![]);
        assert!(t.execute(Action::Long, 1_000.0, 110.0, 2_000, 1, vec![]));

        let pos = t.position().unwrap();
        // 10 units @ 100 plus ~9.09 units @ 110.
        let expected_qty = 10.0 + 1_000.0 / 110.0;
        assert!((pos.quantity - expected_qty).abs() < 1e-9);
        assert!(pos.entry_price > 100.0 && pos.entry_price < 110.0);
        assert_eq!(t.trades().len(), 0);
    }

    #[test]
    fn conservation_final_equity_equals_capital_plus_pnl() {
        let mut t = tracker();
        t.execute(Action::Long, 1_000.0, 100.0, 1_000, 0, vec![]);
        t.close_partial(0.3, 108.0, 2_000, "p1");
        t.execute(Action::Short, 500.0, 108.0, 3_000, 2, vec![]);
        t.close_full(104.0, 4_000, "done");

        let pnl_sum: f64 = t.trades().iter().map(|tr| tr.pnl).sum();
        let final_equity = t.equity(104.0);
        assert!(
            (final_equity - (10_000.0 + pnl_sum)).abs() < 1e-6,
            "equity {final_equity} vs {}",
            10_000.0 + pnl_sum
        );
    }

    #[test]
    fn drawdown_tracks_running_peak() {
        let mut t = tracker();
        t.execute(Action::Long, 5_000.0, 100.0, 1_000, 0, vec![]);
        t.mark(1_000, 110.0);
        let dd_at_peak = t.equity_curve().last().unwrap().drawdown_pct;
        assert!(dd_at_peak < 1e-9);

        t.mark(2_000, 95.0);
        let dd = t.equity_curve().last().unwrap().drawdown_pct;
        assert!(dd > 5.0, "drawdown {dd}");
    }
}
