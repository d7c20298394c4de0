use serde::{Deserialize, Serialize};

/// Volatility zone derived from the ATR percentile rank.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AtrZone {
    Low,
    Normal,
    High,
}

impl AtrZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtrZone::Low => "low",
            AtrZone::Normal => "normal",
            AtrZone::High => "high",
        }
    }
}

/// Rolling quantiles of ATR over a trailing window plus the rank of the
/// current value within that window. Used for zone-specific thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrPercentiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    /// Fraction of window values strictly below the current ATR, in [0, 1].
    pub rank: f64,
}

impl AtrPercentiles {
    /// Compute from the trailing window of ATR values (current value last).
    /// Short windows degrade to a neutral rank rather than failing, so early
    /// bars classify as `Normal`.
    pub fn from_window(window: &[f64], current: f64) -> Self {
        let finite: Vec<f64> = window.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.len() < 4 || !current.is_finite() {
            return Self {
                p25: current,
                p50: current,
                p75: current,
                rank: 0.5,
            };
        }

        let mut sorted = finite.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite atr values"));

        let below = sorted.iter().filter(|&&v| v < current).count();
        let rank = below as f64 / sorted.len() as f64;

        Self {
            p25: quantile_sorted(&sorted, 0.25),
            p50: quantile_sorted(&sorted, 0.50),
            p75: quantile_sorted(&sorted, 0.75),
            rank,
        }
    }

    pub fn zone(&self) -> AtrZone {
        if self.rank < 0.33 {
            AtrZone::Low
        } else if self.rank > 0.67 {
            AtrZone::High
        } else {
            AtrZone::Normal
        }
    }
}

/// Linear-interpolation quantile over a pre-sorted slice.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_and_zone_classification() {
        let window: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let high = AtrPercentiles::from_window(&window, 95.0);
        assert_eq!(high.zone(), AtrZone::High);
        assert!((high.rank - 0.94).abs() < 1e-9);

        let low = AtrPercentiles::from_window(&window, 5.0);
        assert_eq!(low.zone(), AtrZone::Low);

        let mid = AtrPercentiles::from_window(&window, 50.0);
        assert_eq!(mid.zone(), AtrZone::Normal);
        assert!((mid.p50 - 50.5).abs() < 1e-9);
    }

    #[test]
    fn short_window_is_neutral() {
        let p = AtrPercentiles::from_window(&[1.0, 2.0], 1.5);
        assert_eq!(p.rank, 0.5);
        assert_eq!(p.zone(), AtrZone::Normal);
    }
}
