use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Indicator periods and swing parameters for feature extraction. Feature
/// keys embed the configured period (`atr_28` when `atr_period = 28`), so a
/// period change is visible in the vector rather than silently re-using old
/// column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_atr_slow_period")]
    pub atr_slow_period: usize,
    #[serde(default = "default_ema_fast")]
    pub ema_fast_period: usize,
    #[serde(default = "default_ema_slow")]
    pub ema_slow_period: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_bb_period")]
    pub bb_period: usize,
    #[serde(default = "default_bb_std")]
    pub bb_std: f64,
    #[serde(default = "default_adx_period")]
    pub adx_period: usize,
    #[serde(default = "default_swing_lookback")]
    pub swing_lookback: usize,
    #[serde(default = "default_swing_k")]
    pub swing_k: usize,
    /// Trailing window for ATR percentile ranking.
    #[serde(default = "default_atr_percentile_window")]
    pub atr_percentile_window: usize,
}

fn default_atr_period() -> usize {
    14
}
fn default_atr_slow_period() -> usize {
    50
}
fn default_ema_fast() -> usize {
    20
}
fn default_ema_slow() -> usize {
    50
}
fn default_rsi_period() -> usize {
    14
}
fn default_bb_period() -> usize {
    20
}
fn default_bb_std() -> f64 {
    2.0
}
fn default_adx_period() -> usize {
    14
}
fn default_swing_lookback() -> usize {
    50
}
fn default_swing_k() -> usize {
    3
}
fn default_atr_percentile_window() -> usize {
    100
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            atr_period: default_atr_period(),
            atr_slow_period: default_atr_slow_period(),
            ema_fast_period: default_ema_fast(),
            ema_slow_period: default_ema_slow(),
            rsi_period: default_rsi_period(),
            bb_period: default_bb_period(),
            bb_std: default_bb_std(),
            adx_period: default_adx_period(),
            swing_lookback: default_swing_lookback(),
            swing_k: default_swing_k(),
            atr_percentile_window: default_atr_percentile_window(),
        }
    }
}

impl FeatureConfig {
    pub fn atr_key(&self) -> String {
        format!("atr_{}", self.atr_period)
    }

    pub fn atr_slow_key(&self) -> String {
        format!("atr_{}", self.atr_slow_period)
    }

    pub fn ema_fast_key(&self) -> String {
        format!("ema_{}", self.ema_fast_period)
    }

    pub fn ema_slow_key(&self) -> String {
        format!("ema_{}", self.ema_slow_period)
    }

    pub fn rsi_key(&self) -> String {
        format!("rsi_{}", self.rsi_period)
    }

    pub fn bb_key(&self) -> String {
        if self.bb_std.fract() == 0.0 {
            format!("bb_position_{}_{}", self.bb_period, self.bb_std as i64)
        } else {
            format!("bb_position_{}_{}", self.bb_period, self.bb_std)
        }
    }

    pub fn adx_key(&self) -> String {
        format!("adx_{}", self.adx_period)
    }

    /// Keys that must be present and finite in every extracted vector.
    pub fn required_keys(&self) -> Vec<String> {
        vec![
            self.atr_key(),
            self.atr_slow_key(),
            self.ema_fast_key(),
            self.ema_slow_key(),
            self.rsi_key(),
            self.bb_key(),
            self.adx_key(),
            "fib_swing_high".to_string(),
            "fib_swing_low".to_string(),
            "fib_swing_high_idx".to_string(),
            "fib_swing_low_idx".to_string(),
        ]
    }

    /// Bars consumed before the first fully-populated vector.
    pub fn warmup_bars(&self) -> usize {
        let indicator = (self.atr_slow_period + 1)
            .max(self.ema_slow_period)
            .max(self.rsi_period + 1)
            .max(self.bb_period)
            .max(self.adx_period * 2 + 1);
        indicator.max(2 * self.swing_k + 1)
    }

    /// Stable digest over the canonical JSON form, truncated to 16 hex chars.
    /// Identifies the feature schema in caches and result files.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).expect("feature config serializes");
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(digest)[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_embed_configured_periods() {
        let cfg = FeatureConfig {
            atr_period: 28,
            ..FeatureConfig::default()
        };
        assert_eq!(cfg.atr_key(), "atr_28");
        assert_eq!(cfg.bb_key(), "bb_position_20_2");
        assert!(cfg.required_keys().contains(&"atr_28".to_string()));
    }

    #[test]
    fn fingerprint_changes_with_config() {
        let a = FeatureConfig::default();
        let b = FeatureConfig {
            atr_period: 28,
            ..FeatureConfig::default()
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }
}
