use std::collections::BTreeMap;

use genesis_types::{CandleSeries, DataError, Timeframe};
use serde::{Deserialize, Serialize};

use crate::config::FeatureConfig;
use crate::extract::swing_features_at;

/// Precomputed feature columns over full history, keyed by absolute bar
/// index. Immutable once built; loaded into the process once and shared
/// read-only across bars.
///
/// Columns hold exactly the as-of value for their index, so a lookup at
/// absolute index `i` is equivalent to recomputing over `candles[0..=i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCache {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub total_bars: usize,
    /// Fingerprint of the `FeatureConfig` the columns were built with.
    pub config_fingerprint: String,
    columns: BTreeMap<String, Vec<f64>>,
    swing_high_price: Vec<f64>,
    swing_low_price: Vec<f64>,
    swing_high_idx: Vec<f64>,
    swing_low_idx: Vec<f64>,
}

impl FeatureCache {
    /// Build all columns from a validated series.
    pub fn build(series: &CandleSeries, cfg: &FeatureConfig) -> Result<Self, DataError> {
        let candles = series.candles();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let mut columns = BTreeMap::new();
        columns.insert(cfg.atr_key(), indicators::atr(candles, cfg.atr_period)?);
        columns.insert(
            cfg.atr_slow_key(),
            indicators::atr(candles, cfg.atr_slow_period)?,
        );
        columns.insert(
            cfg.ema_fast_key(),
            indicators::ema(&closes, cfg.ema_fast_period)?,
        );
        columns.insert(
            cfg.ema_slow_key(),
            indicators::ema(&closes, cfg.ema_slow_period)?,
        );
        columns.insert(cfg.rsi_key(), indicators::rsi(&closes, cfg.rsi_period)?);
        columns.insert(
            cfg.bb_key(),
            indicators::bollinger_position(&closes, cfg.bb_period, cfg.bb_std)?,
        );
        columns.insert(cfg.adx_key(), indicators::adx(candles, cfg.adx_period)?.adx);

        let swings = indicators::swing_series(candles, cfg.swing_lookback, cfg.swing_k)?;
        let n = candles.len();
        let mut swing_high_price = vec![f64::NAN; n];
        let mut swing_low_price = vec![f64::NAN; n];
        let mut swing_high_idx = vec![f64::NAN; n];
        let mut swing_low_idx = vec![f64::NAN; n];
        for i in 0..n {
            let f = swing_features_at(candles, i, cfg.swing_lookback, &swings, 0);
            swing_high_price[i] = f.0;
            swing_low_price[i] = f.1;
            swing_high_idx[i] = f.2;
            swing_low_idx[i] = f.3;
        }

        Ok(Self {
            symbol: series.symbol.clone(),
            timeframe: series.timeframe,
            total_bars: n,
            config_fingerprint: cfg.fingerprint(),
            columns,
            swing_high_price,
            swing_low_price,
            swing_high_idx,
            swing_low_idx,
        })
    }

    /// Check this cache against the run's identity. A mismatch is fatal; the
    /// caller decides (before attaching) whether explicit mode permits
    /// running without a cache instead.
    pub fn verify(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        total_bars: usize,
        cfg: &FeatureConfig,
    ) -> Result<(), DataError> {
        if self.symbol != symbol || self.timeframe != timeframe {
            return Err(DataError::CacheMismatch(format!(
                "cache is for {}/{}, run is {}/{}",
                self.symbol, self.timeframe, symbol, timeframe
            )));
        }
        if self.total_bars != total_bars {
            return Err(DataError::CacheMismatch(format!(
                "cache has {} bars, run has {}",
                self.total_bars, total_bars
            )));
        }
        let expected = cfg.fingerprint();
        if self.config_fingerprint != expected {
            return Err(DataError::CacheMismatch(format!(
                "cache fingerprint {} != config fingerprint {}",
                self.config_fingerprint, expected
            )));
        }
        Ok(())
    }

    pub fn column(&self, key: &str) -> Option<&[f64]> {
        self.columns.get(key).map(|v| v.as_slice())
    }

    pub fn swing_at(&self, index: usize) -> (f64, f64, f64, f64) {
        (
            self.swing_high_price[index],
            self.swing_low_price[index],
            self.swing_high_idx[index],
            self.swing_low_idx[index],
        )
    }
}
