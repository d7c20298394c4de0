//! Multi-timeframe Fibonacci context.
//!
//! Produces a [`FibContext`] for a higher (or lower) timeframe series at an
//! explicit reference timestamp. The context is computed strictly from bars
//! with `ts <= ref_ts`; a missing reference timestamp is rejected rather than
//! defaulted, because an implicit "now" is how lookahead sneaks in.

use genesis_types::{Candle, CandleSeries, FibContext, FibLevels, FibUnavailableReason};
use indicators::swing_series;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Swing detection parameters for one timeframe's fib context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MtfFibConfig {
    /// Trailing bars searched for the most recent swing pair.
    #[serde(default = "default_swing_lookback")]
    pub swing_lookback: usize,
    /// Symmetric confirmation window; a swing at bar `j` is usable from
    /// `j + swing_k` onward.
    #[serde(default = "default_swing_k")]
    pub swing_k: usize,
}

fn default_swing_lookback() -> usize {
    60
}
fn default_swing_k() -> usize {
    3
}

impl Default for MtfFibConfig {
    fn default() -> Self {
        Self {
            swing_lookback: default_swing_lookback(),
            swing_k: default_swing_k(),
        }
    }
}

/// Build the Fibonacci context for `series` as of `ref_ts`.
///
/// Only bars with `ts <= ref_ts` participate. `last_update` on the result is
/// the timestamp of the matched bar, so data age is measured against the bar
/// actually used rather than the head of the file.
pub fn fib_context(
    series: Option<&CandleSeries>,
    ref_ts: Option<i64>,
    cfg: &MtfFibConfig,
) -> FibContext {
    let Some(ref_ts) = ref_ts else {
        return FibContext::unavailable(FibUnavailableReason::MissingReferenceTs);
    };
    let Some(series) = series.filter(|s| !s.is_empty()) else {
        return FibContext::unavailable(FibUnavailableReason::TimeframeMissing);
    };
    let Some(idx) = series.index_at_or_before(ref_ts) else {
        // Reference predates the series entirely.
        return FibContext::unavailable(FibUnavailableReason::NotApplicable);
    };

    fib_context_from_window(&series.candles()[..=idx], ref_ts, cfg)
}

/// Build a Fibonacci context from a window whose bars are already known to be
/// visible (`ts <= ref_ts` for every bar). The last bar anchors the swing
/// search; `ref_ts` is carried through for age accounting.
pub fn fib_context_from_window(window: &[Candle], ref_ts: i64, cfg: &MtfFibConfig) -> FibContext {
    if window.is_empty() {
        return FibContext::unavailable(FibUnavailableReason::TimeframeMissing);
    }
    let idx = window.len() - 1;
    let swings = match swing_series(window, cfg.swing_lookback, cfg.swing_k) {
        Ok(s) => s,
        Err(_) => {
            debug!(bars = window.len(), "not enough bars for swing detection");
            return FibContext::unavailable(FibUnavailableReason::NotApplicable);
        }
    };

    let (Some(high_idx), Some(low_idx)) = (swings.high_index[idx], swings.low_index[idx]) else {
        return FibContext::unavailable(FibUnavailableReason::LevelsIncomplete);
    };

    let swing_high = swings.high_price[idx];
    let swing_low = swings.low_price[idx];
    let levels = FibLevels::from_swing(swing_low, swing_high);

    // Last update = whichever swing bar is newer.
    let last_update = window[high_idx.max(low_idx)].ts;

    FibContext::checked(ref_ts, swing_low, swing_high, levels, last_update)
}

/// Age of the context's source data relative to the reference timestamp,
/// in milliseconds. `None` when the context is unavailable.
pub fn data_age_ms(ctx: &FibContext) -> Option<i64> {
    match ctx {
        FibContext::Available {
            reference_ts,
            last_update,
            ..
        } => Some(reference_ts - last_update),
        FibContext::Unavailable { .. } => None,
    }
}
