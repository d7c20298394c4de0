use feature_store::{AtrPercentiles, FeatureConfig, FeatureVector};
use genesis_types::{DataError, Regime};
use serde::{Deserialize, Serialize};

/// Thresholds for the rule-based regime classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Minimum relative EMA separation `(fast - slow) / slow` to call a
    /// directional trend.
    #[serde(default = "default_ema_separation")]
    pub ema_separation: f64,
    /// ATR rank below which a non-trending market counts as ranging.
    #[serde(default = "default_ranging_atr_rank")]
    pub ranging_atr_rank: f64,
}

fn default_ema_separation() -> f64 {
    0.002
}
fn default_ranging_atr_rank() -> f64 {
    0.33
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            ema_separation: default_ema_separation(),
            ranging_atr_rank: default_ranging_atr_rank(),
        }
    }
}

/// Classify the regime from EMA order and the ATR percentile rank.
///
/// Trending markets (EMAs separated beyond the threshold) are `bull`/`bear`
/// by EMA order; quiet non-trending markets are `ranging`; everything else
/// is `balanced`.
pub fn classify_regime(
    features: &FeatureVector,
    feature_cfg: &FeatureConfig,
    percentiles: &AtrPercentiles,
    cfg: &RegimeConfig,
) -> Result<Regime, DataError> {
    let ema_fast = features.require(&feature_cfg.ema_fast_key())?;
    let ema_slow = features.require(&feature_cfg.ema_slow_key())?;

    if ema_slow.abs() < f64::EPSILON {
        return Ok(Regime::Balanced);
    }

    let separation = (ema_fast - ema_slow) / ema_slow;
    if separation > cfg.ema_separation {
        return Ok(Regime::Bull);
    }
    if separation < -cfg.ema_separation {
        return Ok(Regime::Bear);
    }
    if percentiles.rank < cfg.ranging_atr_rank {
        return Ok(Regime::Ranging);
    }
    Ok(Regime::Balanced)
}
