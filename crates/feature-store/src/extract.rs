use std::sync::Arc;

use genesis_types::{Candle, CandleSeries, DataError, FibContext};
use indicators::SwingSeries;
use mtf_fib::{fib_context, fib_context_from_window, MtfFibConfig};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cache::FeatureCache;
use crate::config::FeatureConfig;
use crate::percentiles::AtrPercentiles;
use crate::vector::FeatureVector;

/// Where the current window sits in absolute history. `global_index` selects
/// the precomputed fast path; `window_start_idx > 0` marks a mid-history
/// start, which invalidates cached swing columns (their indices refer to
/// bars the run cannot see).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AsOf {
    pub global_index: Option<usize>,
    pub window_start_idx: usize,
}

/// Extraction side-channel: multi-timeframe context, volatility percentiles,
/// and provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMeta {
    pub htf_fibonacci: FibContext,
    pub ltf_fibonacci: FibContext,
    pub atr_percentiles: AtrPercentiles,
    /// Feature-config fingerprint, persisted with results for drift audits.
    pub fingerprint: String,
    pub cache_hit: bool,
}

/// AS-OF feature extractor. One instance per backtest run; the optional
/// cache is attached once, after verification, and never mutated.
pub struct FeatureStore {
    config: FeatureConfig,
    htf_config: MtfFibConfig,
    cache: Option<Arc<FeatureCache>>,
}

impl FeatureStore {
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            htf_config: MtfFibConfig::default(),
            cache: None,
        }
    }

    pub fn with_htf_config(mut self, htf_config: MtfFibConfig) -> Self {
        self.htf_config = htf_config;
        self
    }

    pub fn with_cache(mut self, cache: Arc<FeatureCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Extract the feature vector for `window[now_index]`.
    ///
    /// Only `window[..=now_index]` is read. Every required key is verified
    /// finite before returning; the fast and slow paths produce identical
    /// values for identical visible history.
    pub fn extract(
        &self,
        window: &[Candle],
        now_index: usize,
        asof: &AsOf,
        htf: Option<&CandleSeries>,
    ) -> Result<(FeatureVector, FeatureMeta), DataError> {
        if now_index >= window.len() {
            return Err(DataError::InsufficientData {
                have: window.len(),
                need: now_index + 1,
            });
        }
        let visible = &window[..=now_index];
        let warmup = self.config.warmup_bars();
        if visible.len() < warmup {
            return Err(DataError::InsufficientData {
                have: visible.len(),
                need: warmup,
            });
        }

        let mut fv = FeatureVector::new();
        let cache_hit;
        let atr_current;
        let atr_window: Vec<f64>;

        match (&self.cache, asof.global_index) {
            (Some(cache), Some(gidx)) => {
                if gidx >= cache.total_bars {
                    return Err(DataError::CacheMismatch(format!(
                        "global index {} outside cache of {} bars",
                        gidx, cache.total_bars
                    )));
                }
                if cache.config_fingerprint != self.config.fingerprint() {
                    return Err(DataError::CacheMismatch(format!(
                        "cache fingerprint {} != config fingerprint {}",
                        cache.config_fingerprint,
                        self.config.fingerprint()
                    )));
                }
                cache_hit = true;

                for key in [
                    self.config.atr_key(),
                    self.config.atr_slow_key(),
                    self.config.ema_fast_key(),
                    self.config.ema_slow_key(),
                    self.config.rsi_key(),
                    self.config.bb_key(),
                    self.config.adx_key(),
                ] {
                    let col = cache
                        .column(&key)
                        .ok_or_else(|| DataError::CacheMismatch(format!("missing column {key}")))?;
                    fv.insert(key, col[gidx]);
                }

                if asof.window_start_idx == 0 {
                    let (h, l, hi, li) = cache.swing_at(gidx);
                    fv.insert("fib_swing_high", h);
                    fv.insert("fib_swing_low", l);
                    fv.insert("fib_swing_high_idx", hi);
                    fv.insert("fib_swing_low_idx", li);
                } else {
                    // Mid-history start: cached swing indices reference bars
                    // outside the window, so swings come from the window.
                    trace!(
                        window_start = asof.window_start_idx,
                        "discarding precomputed swing columns"
                    );
                    self.local_swing_features(visible, now_index, asof.window_start_idx, &mut fv)?;
                }

                let atr_col = cache
                    .column(&self.config.atr_key())
                    .expect("atr column verified above");
                atr_current = atr_col[gidx];
                let w = self.config.atr_percentile_window.min(gidx + 1);
                atr_window = atr_col[gidx + 1 - w..=gidx].to_vec();
            }
            _ => {
                cache_hit = false;
                let closes: Vec<f64> = visible.iter().map(|c| c.close).collect();

                let atr_fast = indicators::atr(visible, self.config.atr_period)?;
                let atr_slow = indicators::atr(visible, self.config.atr_slow_period)?;
                let ema_fast = indicators::ema(&closes, self.config.ema_fast_period)?;
                let ema_slow = indicators::ema(&closes, self.config.ema_slow_period)?;
                let rsi = indicators::rsi(&closes, self.config.rsi_period)?;
                let bb =
                    indicators::bollinger_position(&closes, self.config.bb_period, self.config.bb_std)?;
                let adx = indicators::adx(visible, self.config.adx_period)?.adx;

                fv.insert(self.config.atr_key(), atr_fast[now_index]);
                fv.insert(self.config.atr_slow_key(), atr_slow[now_index]);
                fv.insert(self.config.ema_fast_key(), ema_fast[now_index]);
                fv.insert(self.config.ema_slow_key(), ema_slow[now_index]);
                fv.insert(self.config.rsi_key(), rsi[now_index]);
                fv.insert(self.config.bb_key(), bb[now_index]);
                fv.insert(self.config.adx_key(), adx[now_index]);

                self.local_swing_features(visible, now_index, asof.window_start_idx, &mut fv)?;

                atr_current = atr_fast[now_index];
                let w = self.config.atr_percentile_window.min(now_index + 1);
                atr_window = atr_fast[now_index + 1 - w..=now_index].to_vec();
            }
        }

        fv.check_required(&self.config.required_keys())?;

        let ref_ts = visible[now_index].ts;
        let ltf_cfg = MtfFibConfig {
            swing_lookback: self.config.swing_lookback,
            swing_k: self.config.swing_k,
        };
        let meta = FeatureMeta {
            htf_fibonacci: fib_context(htf, Some(ref_ts), &self.htf_config),
            ltf_fibonacci: fib_context_from_window(visible, ref_ts, &ltf_cfg),
            atr_percentiles: AtrPercentiles::from_window(&atr_window, atr_current),
            fingerprint: self.config.fingerprint(),
            cache_hit,
        };

        Ok((fv, meta))
    }

    fn local_swing_features(
        &self,
        visible: &[Candle],
        now_index: usize,
        window_start_idx: usize,
        fv: &mut FeatureVector,
    ) -> Result<(), DataError> {
        let swings =
            indicators::swing_series(visible, self.config.swing_lookback, self.config.swing_k)?;
        let (h, l, hi, li) =
            swing_features_at(visible, now_index, self.config.swing_lookback, &swings, window_start_idx);
        fv.insert("fib_swing_high", h);
        fv.insert("fib_swing_low", l);
        fv.insert("fib_swing_high_idx", hi);
        fv.insert("fib_swing_low_idx", li);
        Ok(())
    }
}

/// Swing features at bar `i`: the most recent confirmed swing pair, falling
/// back to trailing-window extremes when no confirmed swing is in range.
/// Indices are reported in absolute coordinates (`window index + offset`).
pub(crate) fn swing_features_at(
    candles: &[Candle],
    i: usize,
    lookback: usize,
    swings: &SwingSeries,
    offset: usize,
) -> (f64, f64, f64, f64) {
    let window_start = (i + 1).saturating_sub(lookback);

    let (high, high_idx) = match swings.high_index[i] {
        Some(idx) => (swings.high_price[i], idx),
        None => {
            let mut best = window_start;
            for j in window_start..=i {
                if candles[j].high > candles[best].high {
                    best = j;
                }
            }
            (candles[best].high, best)
        }
    };
    let (low, low_idx) = match swings.low_index[i] {
        Some(idx) => (swings.low_price[i], idx),
        None => {
            let mut best = window_start;
            for j in window_start..=i {
                if candles[j].low < candles[best].low {
                    best = j;
                }
            }
            (candles[best].low, best)
        }
    };

    (
        high,
        low,
        (high_idx + offset) as f64,
        (low_idx + offset) as f64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_types::Timeframe;

    fn wave_series(n: usize) -> CandleSeries {
        let candles: Vec<Candle> = (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.35).sin() * 8.0 + (i as f64 * 0.05).cos() * 3.0;
                Candle {
                    ts: 1_700_000_000_000 + i as i64 * 3_600_000,
                    open: c,
                    high: c + 1.2,
                    low: c - 1.2,
                    close: c,
                    volume: 1000.0 + i as f64,
                }
            })
            .collect();
        CandleSeries::new("BTCUSD", Timeframe::Hour1, candles).unwrap()
    }

    #[test]
    fn asof_parity_between_truncated_and_global_index() {
        let series = wave_series(400);
        let cfg = FeatureConfig::default();
        let store = FeatureStore::new(cfg.clone());
        let cache = Arc::new(FeatureCache::build(&series, &cfg).unwrap());
        let fast_store = FeatureStore::new(cfg.clone()).with_cache(cache);

        for i in [120usize, 200, 399] {
            // Slow path on the truncated window.
            let truncated = &series.candles()[..=i];
            let (slow, _) = store
                .extract(truncated, i, &AsOf::default(), None)
                .unwrap();

            // Fast path over full history with the absolute index.
            let asof = AsOf {
                global_index: Some(i),
                window_start_idx: 0,
            };
            let (fast, meta) = fast_store
                .extract(series.candles(), i, &asof, None)
                .unwrap();

            assert!(meta.cache_hit);
            assert_eq!(slow, fast, "fast/slow divergence at bar {i}");
        }
    }

    #[test]
    fn atr_period_flows_through_both_paths() {
        let series = wave_series(300);
        let base = FeatureConfig::default();
        let wide = FeatureConfig {
            atr_period: 28,
            ..FeatureConfig::default()
        };

        let i = 250;
        let (fv14, _) = FeatureStore::new(base.clone())
            .extract(series.candles(), i, &AsOf::default(), None)
            .unwrap();
        let (fv28, _) = FeatureStore::new(wide.clone())
            .extract(series.candles(), i, &AsOf::default(), None)
            .unwrap();

        let a14 = fv14.require("atr_14").unwrap();
        let a28 = fv28.require("atr_28").unwrap();
        assert!((a14 - a28).abs() > 1e-12);

        // Fast path honours the period too.
        let cache = Arc::new(FeatureCache::build(&series, &wide).unwrap());
        let asof = AsOf {
            global_index: Some(i),
            window_start_idx: 0,
        };
        let (fast28, _) = FeatureStore::new(wide)
            .with_cache(cache)
            .extract(series.candles(), i, &asof, None)
            .unwrap();
        assert_eq!(fast28.require("atr_28").unwrap(), a28);
    }

    #[test]
    fn cache_fingerprint_mismatch_is_fatal() {
        let series = wave_series(300);
        let cache =
            Arc::new(FeatureCache::build(&series, &FeatureConfig::default()).unwrap());
        let other = FeatureConfig {
            rsi_period: 21,
            ..FeatureConfig::default()
        };
        let store = FeatureStore::new(other).with_cache(cache);
        let asof = AsOf {
            global_index: Some(200),
            window_start_idx: 0,
        };
        let err = store
            .extract(series.candles(), 200, &asof, None)
            .unwrap_err();
        assert!(matches!(err, DataError::CacheMismatch(_)));
    }

    #[test]
    fn mid_history_start_discards_cached_swings() {
        let series = wave_series(400);
        let cfg = FeatureConfig::default();
        let cache = Arc::new(FeatureCache::build(&series, &cfg).unwrap());

        // Window starting at absolute bar 150.
        let window = &series.candles()[150..];
        let now = 150; // absolute bar 300
        let asof = AsOf {
            global_index: Some(300),
            window_start_idx: 150,
        };
        let store = FeatureStore::new(cfg.clone()).with_cache(cache);
        let (fv, _) = store.extract(window, now, &asof, None).unwrap();

        // Swing indices must be derivable from the window alone: absolute
        // index never precedes the window start.
        let hi = fv.require("fib_swing_high_idx").unwrap();
        let li = fv.require("fib_swing_low_idx").unwrap();
        assert!(hi >= 150.0 && li >= 150.0);

        // Indicator columns still come from the cache.
        let slow = FeatureStore::new(cfg);
        let (fv_slow, _) = slow.extract(window, now, &AsOf::default(), None).unwrap();
        // ATR from full history differs from window-local warmup in general;
        // both must be finite and positive.
        assert!(fv.require("atr_14").unwrap() > 0.0);
        assert!(fv_slow.require("atr_14").unwrap() > 0.0);
    }

    #[test]
    fn never_reads_past_now_index() {
        let series = wave_series(300);
        let store = FeatureStore::new(FeatureConfig::default());
        let i = 200;

        // Corrupt everything after i; extraction must not change.
        let mut mutated = series.candles().to_vec();
        for c in mutated.iter_mut().skip(i + 1) {
            c.open = 1e9;
            c.high = 1e9;
            c.low = 1e9;
            c.close = 1e9;
        }
        let (clean, _) = store
            .extract(series.candles(), i, &AsOf::default(), None)
            .unwrap();
        let (dirty, _) = store.extract(&mutated, i, &AsOf::default(), None).unwrap();
        assert_eq!(clean, dirty);
    }
}
