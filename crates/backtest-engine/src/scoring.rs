use serde::{Deserialize, Serialize};

use crate::metrics::Metrics;

/// Composite-score formula version. V2 is the default; V1 is kept for
/// comparing against older studies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreVersion {
    V1,
    V2,
}

impl Default for ScoreVersion {
    fn default() -> Self {
        ScoreVersion::V2
    }
}

fn clip(value: f64, lo: f64, hi: f64) -> f64 {
    value.clamp(lo, hi)
}

/// Composite score for the optimizer. Sharpe dominates; return, profit
/// factor, and win rate contribute bounded adjustments so no single metric
/// can run away with the search.
pub fn composite_score(metrics: &Metrics, version: ScoreVersion) -> f64 {
    match version {
        ScoreVersion::V1 => clip(metrics.sharpe, -1.0, 3.0),
        ScoreVersion::V2 => {
            let sharpe_term = clip(metrics.sharpe, -1.0, 3.0);
            let return_term = 0.15 * clip(metrics.total_return, -0.5, 0.5).ln_1p();
            // Profit factor is clipped before the log so an infinite PF
            // (no losses) contributes a bounded bonus.
            let pf_term = 0.10 * clip(metrics.profit_factor, 0.25, 5.0).ln();
            let winrate_term = 0.05 * clip(metrics.win_rate - 0.5, -0.1, 0.1);
            sharpe_term + return_term + pf_term + winrate_term
        }
    }
}

#[cfg(test)]
mod scoring_tests {
    use super::*;

    fn metrics(sharpe: f64, ret: f64, pf: f64, wr: f64) -> Metrics {
        Metrics {
            sharpe,
            total_return: ret,
            profit_factor: pf,
            win_rate: wr,
            ..Metrics::empty()
        }
    }

    #[test]
    fn neutral_run_scores_near_zero() {
        let m = metrics(0.0, 0.0, 1.0, 0.5);
        let s = composite_score(&m, ScoreVersion::V2);
        assert!(s.abs() < 1e-9, "score {s}");
    }

    #[test]
    fn infinite_profit_factor_is_bounded() {
        let m = metrics(1.0, 0.2, f64::INFINITY, 0.9);
        let s = composite_score(&m, ScoreVersion::V2);
        assert!(s.is_finite());
        // PF clipped to 5.0, winrate clipped to +0.1.
        let expected = 1.0 + 0.15 * 0.2_f64.ln_1p() + 0.10 * 5.0_f64.ln() + 0.05 * 0.1;
        assert!((s - expected).abs() < 1e-12);
    }

    #[test]
    fn sharpe_is_clipped_both_ways() {
        let hot = metrics(10.0, 0.0, 1.0, 0.5);
        let cold = metrics(-10.0, 0.0, 1.0, 0.5);
        assert!((composite_score(&hot, ScoreVersion::V2) - 3.0).abs() < 1e-12);
        assert!((composite_score(&cold, ScoreVersion::V2) + 1.0).abs() < 1e-12);
    }
}
