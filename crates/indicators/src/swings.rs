use genesis_types::{Candle, DataError};
use serde::{Deserialize, Serialize};

/// A confirmed swing extreme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    /// Bar index of the extreme itself.
    pub index: usize,
    /// Bar index at which the extreme became known (`index + k`).
    pub confirmed_at: usize,
    pub price: f64,
}

/// As-of swing state per bar: for each bar `i`, the most recent swing
/// high/low whose confirmation window closed at or before `i`, restricted to
/// a trailing lookback.
///
/// Values are parallel to the input; NaN / `None` where no swing is visible
/// yet. Because entries only include swings already confirmed at `i`, the
/// series is safe to precompute over full history and index by absolute bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingSeries {
    pub high_price: Vec<f64>,
    pub low_price: Vec<f64>,
    pub high_index: Vec<Option<usize>>,
    pub low_index: Vec<Option<usize>>,
}

/// Detect swing extremes with a strictly symmetric `k`-bar confirmation
/// window: bar `j` is a swing high iff its high strictly exceeds the highs of
/// the `k` bars on each side. The swing only enters the series at bar
/// `j + k`, so no output depends on bars after its own index.
pub fn swing_series(
    candles: &[Candle],
    lookback: usize,
    k: usize,
) -> Result<SwingSeries, DataError> {
    if k == 0 || lookback <= k {
        return Err(DataError::InsufficientData {
            have: lookback,
            need: k + 1,
        });
    }
    if candles.len() < 2 * k + 1 {
        return Err(DataError::InsufficientData {
            have: candles.len(),
            need: 2 * k + 1,
        });
    }

    let n = candles.len();
    let mut highs: Vec<SwingPoint> = Vec::new();
    let mut lows: Vec<SwingPoint> = Vec::new();

    for j in k..n - k {
        let is_high = (1..=k).all(|d| {
            candles[j].high > candles[j - d].high && candles[j].high > candles[j + d].high
        });
        if is_high {
            highs.push(SwingPoint {
                index: j,
                confirmed_at: j + k,
                price: candles[j].high,
            });
        }
        let is_low = (1..=k)
            .all(|d| candles[j].low < candles[j - d].low && candles[j].low < candles[j + d].low);
        if is_low {
            lows.push(SwingPoint {
                index: j,
                confirmed_at: j + k,
                price: candles[j].low,
            });
        }
    }

    let mut series = SwingSeries {
        high_price: vec![f64::NAN; n],
        low_price: vec![f64::NAN; n],
        high_index: vec![None; n],
        low_index: vec![None; n],
    };

    let mut hi = 0usize; // next swing high not yet confirmed
    let mut lo = 0usize;
    let mut last_high: Option<SwingPoint> = None;
    let mut last_low: Option<SwingPoint> = None;

    for i in 0..n {
        while hi < highs.len() && highs[hi].confirmed_at <= i {
            last_high = Some(highs[hi]);
            hi += 1;
        }
        while lo < lows.len() && lows[lo].confirmed_at <= i {
            last_low = Some(lows[lo]);
            lo += 1;
        }
        let min_index = (i + 1).saturating_sub(lookback);
        if let Some(h) = last_high {
            if h.index >= min_index {
                series.high_price[i] = h.price;
                series.high_index[i] = Some(h.index);
            }
        }
        if let Some(l) = last_low {
            if l.index >= min_index {
                series.low_price[i] = l.price;
                series.low_index[i] = Some(l.index);
            }
        }
    }

    Ok(series)
}
