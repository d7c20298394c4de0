use genesis_types::{EquitySnapshot, Timeframe, Trade};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Trade-level and equity-curve metrics, all net of commissions. Monetary
/// figures come from the equity curve, not trade-list reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub num_trades: usize,
    pub win_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    /// `gross_profit / |gross_loss|`; infinite when nothing was lost.
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub avg_holding_bars: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub exposure_pct: f64,

    pub total_return: f64,
    pub max_drawdown_pct: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub total_commission: f64,
}

impl Metrics {
    pub fn empty() -> Self {
        Self {
            num_trades: 0,
            win_rate: 0.0,
            gross_profit: 0.0,
            gross_loss: 0.0,
            profit_factor: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            avg_holding_bars: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            max_consecutive_wins: 0,
            max_consecutive_losses: 0,
            exposure_pct: 0.0,
            total_return: 0.0,
            max_drawdown_pct: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
            calmar: 0.0,
            total_commission: 0.0,
        }
    }
}

/// Compute the full metric set from a finished run.
pub fn compute_metrics(
    trades: &[Trade],
    equity_curve: &[EquitySnapshot],
    initial_capital: f64,
    total_commission: f64,
    timeframe: Timeframe,
) -> Metrics {
    let mut m = Metrics::empty();
    m.num_trades = trades.len();
    m.total_commission = total_commission;

    // --- Trade-level ---
    if !trades.is_empty() {
        let wins: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|&p| p > 0.0).collect();
        let losses: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|&p| p <= 0.0).collect();

        m.win_rate = wins.len() as f64 / trades.len() as f64;
        m.gross_profit = wins.iter().sum();
        m.gross_loss = losses.iter().sum();
        m.profit_factor = if m.gross_loss.abs() > 0.0 {
            m.gross_profit / m.gross_loss.abs()
        } else if m.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        m.avg_win = if wins.is_empty() {
            0.0
        } else {
            m.gross_profit / wins.len() as f64
        };
        m.avg_loss = if losses.is_empty() {
            0.0
        } else {
            m.gross_loss / losses.len() as f64
        };
        m.largest_win = wins.iter().copied().fold(0.0, f64::max);
        m.largest_loss = losses.iter().copied().fold(0.0, f64::min);

        let bar_ms = timeframe.bar_ms();
        m.avg_holding_bars = trades
            .iter()
            .map(|t| t.holding_bars(bar_ms) as f64)
            .sum::<f64>()
            / trades.len() as f64;

        let mut cur_wins = 0usize;
        let mut cur_losses = 0usize;
        for t in trades {
            if t.pnl > 0.0 {
                cur_wins += 1;
                cur_losses = 0;
            } else {
                cur_losses += 1;
                cur_wins = 0;
            }
            m.max_consecutive_wins = m.max_consecutive_wins.max(cur_wins);
            m.max_consecutive_losses = m.max_consecutive_losses.max(cur_losses);
        }
    }

    // --- Equity-level ---
    if let Some(last) = equity_curve.last() {
        m.total_return = if initial_capital > 0.0 {
            (last.equity - initial_capital) / initial_capital
        } else {
            0.0
        };
        m.max_drawdown_pct = equity_curve
            .iter()
            .map(|s| s.drawdown_pct)
            .fold(0.0, f64::max);

        m.exposure_pct = equity_curve
            .iter()
            .filter(|s| s.unrealized_pnl != 0.0)
            .count() as f64
            / equity_curve.len() as f64
            * 100.0;

        let returns: Vec<f64> = equity_curve
            .windows(2)
            .map(|w| {
                if w[0].equity > 0.0 {
                    (w[1].equity - w[0].equity) / w[0].equity
                } else {
                    0.0
                }
            })
            .collect();

        if returns.len() >= 2 {
            let annualizer = timeframe.bars_per_year().sqrt();
            let mean = returns.iter().copied().mean();
            let std = returns.iter().copied().std_dev();
            // Zero variance yields zero, never NaN.
            m.sharpe = if std > 1e-12 {
                mean / std * annualizer
            } else {
                0.0
            };

            let downside: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();
            if downside.is_empty() {
                m.sortino = 0.0;
            } else {
                let downside_var =
                    downside.iter().map(|r| r * r).sum::<f64>() / downside.len() as f64;
                let downside_std = downside_var.sqrt();
                m.sortino = if downside_std > 1e-12 {
                    mean / downside_std * annualizer
                } else {
                    0.0
                };
            }
        }

        let dd = m.max_drawdown_pct / 100.0;
        m.calmar = if dd > 1e-12 {
            m.total_return / dd
        } else if m.total_return > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
    }

    m
}

#[cfg(test)]
mod metrics_tests {
    use super::*;
    use genesis_types::Side;

    fn trade(pnl: f64) -> Trade {
        Trade {
            side: Side::Long,
            size: 1.0,
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            entry_ts: 0,
            exit_ts: 3_600_000,
            pnl,
            commission: 0.0,
            entry_reasons: vec![],
            exit_reason: "test".to_string(),
        }
    }

    fn flat_curve(n: usize, equity: f64) -> Vec<EquitySnapshot> {
        (0..n)
            .map(|i| EquitySnapshot {
                ts: i as i64 * 3_600_000,
                equity,
                unrealized_pnl: 0.0,
                drawdown_pct: 0.0,
            })
            .collect()
    }

    #[test]
    fn profit_factor_infinite_without_losses() {
        let trades = vec![trade(50.0), trade(20.0)];
        let m = compute_metrics(&trades, &flat_curve(10, 10_000.0), 10_000.0, 0.0, Timeframe::Hour1);
        assert!(m.profit_factor.is_infinite());
        assert_eq!(m.win_rate, 1.0);
        assert_eq!(m.max_consecutive_wins, 2);
    }

    #[test]
    fn zero_variance_sharpe_is_zero_not_nan() {
        let m = compute_metrics(&[], &flat_curve(50, 10_000.0), 10_000.0, 0.0, Timeframe::Hour1);
        assert_eq!(m.sharpe, 0.0);
        assert_eq!(m.total_return, 0.0);
        assert!(!m.sharpe.is_nan());
    }

    #[test]
    fn consecutive_streaks() {
        let trades = vec![trade(1.0), trade(-1.0), trade(-2.0), trade(-3.0), trade(4.0)];
        let m = compute_metrics(&trades, &flat_curve(10, 10_000.0), 10_000.0, 0.0, Timeframe::Hour1);
        assert_eq!(m.max_consecutive_losses, 3);
        assert_eq!(m.max_consecutive_wins, 1);
        assert!((m.win_rate - 0.4).abs() < 1e-12);
    }

    #[test]
    fn drawdown_and_return_come_from_equity_curve() {
        let mut curve = flat_curve(4, 10_000.0);
        curve[1].equity = 11_000.0;
        curve[2].equity = 9_900.0;
        curve[2].drawdown_pct = 10.0;
        curve[3].equity = 10_500.0;
        curve[3].drawdown_pct = 4.5;
        let m = compute_metrics(&[], &curve, 10_000.0, 0.0, Timeframe::Daily);
        assert!((m.total_return - 0.05).abs() < 1e-12);
        assert!((m.max_drawdown_pct - 10.0).abs() < 1e-12);
        assert!(m.calmar > 0.0);
    }
}
