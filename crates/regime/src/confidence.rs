use genesis_types::{Candle, Confidence, Probas};
use serde::{Deserialize, Serialize};

/// Quality multipliers applied to raw probabilities. Each factor lives in
/// `[0, 1]`; 1.0 means "no penalty".
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityFactors {
    /// Current volume relative to its trailing average, capped at 1.
    pub volume_score: f64,
    /// Penalty for wide bars (proxy for spread/illiquidity).
    pub spread_factor: f64,
    /// External data-quality input (gap scans etc.); 1.0 when unknown.
    pub data_quality: f64,
}

impl QualityFactors {
    pub fn neutral() -> Self {
        Self {
            volume_score: 1.0,
            spread_factor: 1.0,
            data_quality: 1.0,
        }
    }

    pub fn combined(&self) -> f64 {
        (self.volume_score * self.spread_factor * self.data_quality).clamp(0.0, 1.0)
    }

    /// Derive volume and spread factors from the visible window.
    pub fn from_window(window: &[Candle], cfg: &ConfidenceConfig) -> Self {
        let Some(current) = window.last() else {
            return Self::neutral();
        };

        let lookback = cfg.volume_lookback.min(window.len());
        let avg_volume = window[window.len() - lookback..]
            .iter()
            .map(|c| c.volume)
            .sum::<f64>()
            / lookback as f64;
        let volume_score = if avg_volume > 0.0 {
            (current.volume / avg_volume).min(1.0)
        } else {
            1.0
        };

        let spread_ratio = if current.close > 0.0 {
            (current.high - current.low) / current.close
        } else {
            0.0
        };
        let spread_factor = 1.0 / (1.0 + spread_ratio * cfg.spread_sensitivity);

        Self {
            volume_score,
            spread_factor,
            data_quality: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_volume_lookback")]
    pub volume_lookback: usize,
    /// How strongly wide bars reduce confidence.
    #[serde(default = "default_spread_sensitivity")]
    pub spread_sensitivity: f64,
}

fn default_volume_lookback() -> usize {
    20
}
fn default_spread_sensitivity() -> f64 {
    2.0
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            volume_lookback: default_volume_lookback(),
            spread_sensitivity: default_spread_sensitivity(),
        }
    }
}

/// Confidence = raw probabilities scaled by the combined quality factor,
/// clamped to `[0, 1]`. `overall` is the max of the two legs.
pub fn score_confidence(probas: &Probas, quality: &QualityFactors) -> Confidence {
    let q = quality.combined();
    let buy = (probas.buy * q).clamp(0.0, 1.0);
    let sell = (probas.sell * q).clamp(0.0, 1.0);
    Confidence {
        buy,
        sell,
        overall: buy.max(sell),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_quality_passes_probas_through() {
        let p = Probas { buy: 0.8, sell: 0.1 };
        let c = score_confidence(&p, &QualityFactors::neutral());
        assert_eq!(c.buy, 0.8);
        assert_eq!(c.overall, 0.8);
    }

    #[test]
    fn quality_factors_scale_down() {
        let p = Probas { buy: 0.8, sell: 0.1 };
        let q = QualityFactors {
            volume_score: 0.5,
            spread_factor: 1.0,
            data_quality: 1.0,
        };
        let c = score_confidence(&p, &q);
        assert!((c.buy - 0.4).abs() < 1e-12);
        assert!((c.overall - 0.4).abs() < 1e-12);
    }

    #[test]
    fn low_volume_reduces_volume_score() {
        let mut window: Vec<Candle> = (0..30)
            .map(|i| Candle {
                ts: i as i64 * 3_600_000,
                open: 100.0,
                high: 100.5,
                low: 99.5,
                close: 100.0,
                volume: 1000.0,
            })
            .collect();
        window.last_mut().unwrap().volume = 250.0;
        let q = QualityFactors::from_window(&window, &ConfidenceConfig::default());
        assert!(q.volume_score < 0.3);
        assert!(q.spread_factor < 1.0 && q.spread_factor > 0.9);
    }
}
