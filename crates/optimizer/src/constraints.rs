use backtest_engine::Metrics;
use serde::{Deserialize, Serialize};

/// Score assigned when any hard constraint fails.
pub const HARD_FAILURE_SCORE: f64 = -100.0;
/// Score assigned when the abort heuristic projects zero trades.
pub const ZERO_TRADE_ABORT_SCORE: f64 = -500.0;

/// Trial constraints. Hard failures floor the score; soft violations
/// subtract a penalty but keep the gradient so the sampler can still rank
/// near-misses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintConfig {
    #[serde(default = "default_min_trades")]
    pub min_trades: usize,
    #[serde(default = "default_min_profit_factor")]
    pub min_profit_factor: f64,
    /// Maximum tolerated drawdown, as a fraction (0.35 = 35%).
    #[serde(default = "default_max_max_dd")]
    pub max_max_dd: f64,
    #[serde(default)]
    pub max_trades: Option<usize>,
    /// Cap on total commission as a fraction of initial capital.
    #[serde(default)]
    pub max_total_commission_pct: Option<f64>,
    #[serde(default = "default_soft_penalty")]
    pub soft_penalty: f64,
}

fn default_min_trades() -> usize {
    10
}
fn default_min_profit_factor() -> f64 {
    1.0
}
fn default_max_max_dd() -> f64 {
    0.35
}
fn default_soft_penalty() -> f64 {
    150.0
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            min_trades: default_min_trades(),
            min_profit_factor: default_min_profit_factor(),
            max_max_dd: default_max_max_dd(),
            max_trades: None,
            max_total_commission_pct: None,
            soft_penalty: default_soft_penalty(),
        }
    }
}

/// Outcome of constraint evaluation, persisted with the trial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintVerdict {
    pub hard_failures: Vec<String>,
    pub soft_violations: Vec<String>,
}

impl ConstraintVerdict {
    pub fn passed(&self) -> bool {
        self.hard_failures.is_empty() && self.soft_violations.is_empty()
    }
}

impl ConstraintConfig {
    /// Evaluate metrics and adjust the raw composite score.
    pub fn apply(
        &self,
        metrics: &Metrics,
        initial_capital: f64,
        raw_score: f64,
        risk_map: &[(f64, f64)],
    ) -> (f64, ConstraintVerdict) {
        let mut verdict = ConstraintVerdict::default();

        if metrics.num_trades < self.min_trades {
            verdict.hard_failures.push(format!(
                "num_trades {} < min_trades {}",
                metrics.num_trades, self.min_trades
            ));
        }
        if metrics.profit_factor < self.min_profit_factor {
            verdict.hard_failures.push(format!(
                "profit_factor {:.3} < min {:.3}",
                metrics.profit_factor, self.min_profit_factor
            ));
        }
        if metrics.max_drawdown_pct / 100.0 > self.max_max_dd {
            verdict.hard_failures.push(format!(
                "max_drawdown {:.3} > max {:.3}",
                metrics.max_drawdown_pct / 100.0,
                self.max_max_dd
            ));
        }
        if !verdict.hard_failures.is_empty() {
            return (HARD_FAILURE_SCORE, verdict);
        }

        if let Some(max_trades) = self.max_trades {
            if metrics.num_trades > max_trades {
                verdict.soft_violations.push(format!(
                    "num_trades {} > max_trades {max_trades}",
                    metrics.num_trades
                ));
            }
        }
        if let Some(max_commission_pct) = self.max_total_commission_pct {
            let pct = if initial_capital > 0.0 {
                metrics.total_commission / initial_capital
            } else {
                0.0
            };
            if pct > max_commission_pct {
                verdict.soft_violations.push(format!(
                    "total_commission {:.4} of capital > max {:.4}",
                    pct, max_commission_pct
                ));
            }
        }
        // Zone ordering: risk-map sizes must be non-decreasing in
        // confidence, or the sizing curve is inverted.
        let mut sorted = risk_map.to_vec();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        if sorted.windows(2).any(|w| w[1].1 < w[0].1) {
            verdict
                .soft_violations
                .push("risk_map sizes decrease with confidence".to_string());
        }

        let score = if verdict.soft_violations.is_empty() {
            raw_score
        } else {
            raw_score - self.soft_penalty
        };
        (score, verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(trades: usize, pf: f64, dd_pct: f64) -> Metrics {
        Metrics {
            num_trades: trades,
            profit_factor: pf,
            max_drawdown_pct: dd_pct,
            sharpe: 1.0,
            ..Metrics::empty()
        }
    }

    #[test]
    fn hard_failure_floors_score_and_lists_reasons() {
        let cfg = ConstraintConfig::default();
        let (score, verdict) = cfg.apply(&metrics(3, 1.5, 10.0), 10_000.0, 1.2, &[]);
        assert_eq!(score, HARD_FAILURE_SCORE);
        assert_eq!(verdict.hard_failures.len(), 1);
        assert!(verdict.hard_failures[0].contains("num_trades"));
    }

    #[test]
    fn soft_violation_subtracts_penalty_keeping_gradient() {
        let cfg = ConstraintConfig {
            max_trades: Some(20),
            ..ConstraintConfig::default()
        };
        let (a, va) = cfg.apply(&metrics(25, 1.5, 10.0), 10_000.0, 1.2, &[]);
        let (b, vb) = cfg.apply(&metrics(25, 1.5, 10.0), 10_000.0, 0.8, &[]);
        assert!(!va.passed() && !vb.passed());
        assert!((a - (1.2 - 150.0)).abs() < 1e-12);
        assert!(a > b, "gradient preserved between penalised trials");
    }

    #[test]
    fn inverted_risk_map_is_a_soft_violation()
    {
        let cfg = ConstraintConfig::default();
        let inverted = vec![(0.0, 0.05), (0.5, 0.02)];
        let (score, verdict) = cfg.apply(&metrics(15, 1.5, 10.0), 10_000.0, 1.0, &inverted);
        assert_eq!(verdict.soft_violations.len(), 1);
        assert!(score < 0.0);
    }

    #[test]
    fn clean_trial_keeps_raw_score() {
        let cfg = ConstraintConfig::default();
        let (score, verdict) =
            cfg.apply(&metrics(15, 1.5, 10.0), 10_000.0, 1.7, &[(0.0, 0.01), (0.5, 0.02)]);
        assert!(verdict.passed());
        assert_eq!(score, 1.7);
    }
}
