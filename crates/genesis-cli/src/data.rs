use std::path::Path;

use anyhow::{bail, Context, Result};
use genesis_types::{Candle, CandleSeries, Timeframe};
use tracing::warn;

/// Load a candle file into a validated series. JSON files hold an array of
/// candle objects; CSV files hold `ts,open,high,low,close,volume` rows with
/// an optional header. Timestamps are ms UTC.
pub fn load_candles(path: &Path, symbol: &str, timeframe: Timeframe) -> Result<CandleSeries> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading candles from {}", path.display()))?;

    let candles = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str::<Vec<Candle>>(&raw)
            .with_context(|| format!("parsing JSON candles from {}", path.display()))?,
        _ => parse_csv(&raw)?,
    };

    if candles.is_empty() {
        bail!("{} contains no candles", path.display());
    }

    // Range violations are logged, not fatal; ordering problems are.
    for (i, c) in candles.iter().enumerate() {
        if c.high < c.open.max(c.close) || c.low > c.open.min(c.close) {
            warn!(index = i, ts = c.ts, "candle range does not contain open/close");
        }
    }

    Ok(CandleSeries::new(symbol, timeframe, candles)?)
}

fn parse_csv(raw: &str) -> Result<Vec<Candle>> {
    let mut candles = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Tolerate a header row.
        if lineno == 0 && line.to_ascii_lowercase().starts_with("ts") {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 6 {
            bail!("line {}: expected 6 fields, got {}", lineno + 1, fields.len());
        }
        candles.push(Candle {
            ts: fields[0]
                .parse()
                .with_context(|| format!("line {}: bad timestamp", lineno + 1))?,
            open: fields[1].parse()?,
            high: fields[2].parse()?,
            low: fields[3].parse()?,
            close: fields[4].parse()?,
            volume: fields[5].parse()?,
        });
    }
    Ok(candles)
}

/// Restrict a series to `[start, end]` (ms, inclusive). `None` bounds are
/// open.
pub fn slice_range(
    series: &CandleSeries,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<CandleSeries> {
    let filtered: Vec<Candle> = series
        .candles()
        .iter()
        .copied()
        .filter(|c| start.map(|s| c.ts >= s).unwrap_or(true) && end.map(|e| c.ts <= e).unwrap_or(true))
        .collect();
    if filtered.is_empty() {
        bail!("no candles remain after applying --start/--end");
    }
    Ok(CandleSeries::new(
        series.symbol.clone(),
        series.timeframe,
        filtered,
    )?)
}
