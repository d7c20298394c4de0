use serde::{Deserialize, Serialize};

use crate::decision::Side;
use crate::error::DataError;
use crate::timeframe::Timeframe;

/// OHLCV candle. Timestamps are milliseconds since epoch, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// True range against the previous close.
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// A validated, strictly time-sorted candle sequence for one
/// (symbol, timeframe).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Build a series, rejecting out-of-order or duplicate timestamps and
    /// non-finite OHLCV values. Range violations (`high < close` etc.) are
    /// tolerated; callers log them separately.
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Result<Self, DataError> {
        for (i, c) in candles.iter().enumerate() {
            let finite = c.open.is_finite()
                && c.high.is_finite()
                && c.low.is_finite()
                && c.close.is_finite()
                && c.volume.is_finite();
            if !finite {
                return Err(DataError::NonFiniteCandle { index: i, ts: c.ts });
            }
        }
        for i in 1..candles.len() {
            let prev = candles[i - 1].ts;
            let cur = candles[i].ts;
            if cur == prev {
                return Err(DataError::DuplicateTimestamp { index: i, ts: cur });
            }
            if cur < prev {
                return Err(DataError::OutOfOrderTimestamp { index: i, ts: cur });
            }
        }
        Ok(Self {
            symbol: symbol.into(),
            timeframe,
            candles,
        })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Index of the last candle with `ts <= ref_ts`, if any.
    pub fn index_at_or_before(&self, ref_ts: i64) -> Option<usize> {
        match self.candles.binary_search_by_key(&ref_ts, |c| c.ts) {
            Ok(i) => Some(i),
            Err(0) => None,
            Err(i) => Some(i - 1),
        }
    }
}

/// A closed trade segment. Partial closes produce one record each; `pnl` is
/// net of entry and exit commissions attributed to the closed size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_ts: i64,
    pub exit_ts: i64,
    pub pnl: f64,
    pub commission: f64,
    pub entry_reasons: Vec<String>,
    pub exit_reason: String,
}

impl Trade {
    pub fn holding_bars(&self, bar_ms: i64) -> i64 {
        if bar_ms <= 0 {
            return 0;
        }
        (self.exit_ts - self.entry_ts) / bar_ms
    }
}

/// Per-bar equity curve point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub ts: i64,
    pub equity: f64,
    pub unrealized_pnl: f64,
    pub drawdown_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, px: f64) -> Candle {
        Candle {
            ts,
            open: px,
            high: px + 1.0,
            low: px - 1.0,
            close: px,
            volume: 1000.0,
        }
    }

    #[test]
    fn rejects_duplicate_timestamps() {
        let candles = vec![candle(1000, 100.0), candle(2000, 101.0), candle(2000, 102.0)];
        let err = CandleSeries::new("BTCUSD", Timeframe::Hour1, candles).unwrap_err();
        assert!(matches!(err, DataError::DuplicateTimestamp { index: 2, ts: 2000 }));
    }

    #[test]
    fn rejects_out_of_order_timestamps() {
        let candles = vec![candle(2000, 100.0), candle(1000, 101.0)];
        let err = CandleSeries::new("BTCUSD", Timeframe::Hour1, candles).unwrap_err();
        assert!(matches!(err, DataError::OutOfOrderTimestamp { index: 1, .. }));
    }

    #[test]
    fn index_at_or_before_picks_last_visible_bar() {
        let candles = vec![candle(1000, 100.0), candle(2000, 101.0), candle(3000, 102.0)];
        let series = CandleSeries::new("BTCUSD", Timeframe::Hour1, candles).unwrap();
        assert_eq!(series.index_at_or_before(2500), Some(1));
        assert_eq!(series.index_at_or_before(2000), Some(1));
        assert_eq!(series.index_at_or_before(999), None);
    }
}
