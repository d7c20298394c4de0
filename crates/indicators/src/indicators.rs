use genesis_types::{Candle, DataError};

/// Simple Moving Average. NaN until `period - 1`.
pub fn sma(data: &[f64], period: usize) -> Result<Vec<f64>, DataError> {
    if period == 0 || data.len() < period {
        return Err(DataError::InsufficientData {
            have: data.len(),
            need: period.max(1),
        });
    }

    let mut result = vec![f64::NAN; data.len()];
    let mut window_sum: f64 = data[..period].iter().sum();
    result[period - 1] = window_sum / period as f64;
    for i in period..data.len() {
        window_sum += data[i] - data[i - period];
        result[i] = window_sum / period as f64;
    }
    Ok(result)
}

/// Exponential Moving Average, seeded with the SMA of the first `period`
/// values. NaN until `period - 1`.
pub fn ema(data: &[f64], period: usize) -> Result<Vec<f64>, DataError> {
    if period == 0 || data.len() < period {
        return Err(DataError::InsufficientData {
            have: data.len(),
            need: period.max(1),
        });
    }

    let mut result = vec![f64::NAN; data.len()];
    let multiplier = 2.0 / (period as f64 + 1.0);

    let seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = seed;

    for i in period..data.len() {
        let prev = result[i - 1];
        result[i] = (data[i] - prev) * multiplier + prev;
    }
    Ok(result)
}

/// Relative Strength Index using Wilder's smoothing. NaN until `period`.
pub fn rsi(data: &[f64], period: usize) -> Result<Vec<f64>, DataError> {
    if period == 0 || data.len() < period + 1 {
        return Err(DataError::InsufficientData {
            have: data.len(),
            need: period + 1,
        });
    }

    let mut result = vec![f64::NAN; data.len()];

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += change.abs();
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = rsi_from_averages(avg_gain, avg_loss);

    for i in period + 1..data.len() {
        let change = data[i] - data[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, change.abs())
        };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        result[i] = rsi_from_averages(avg_gain, avg_loss);
    }
    Ok(result)
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Average True Range using Wilder's smoothing. NaN until `period`.
pub fn atr(candles: &[Candle], period: usize) -> Result<Vec<f64>, DataError> {
    if period == 0 || candles.len() < period + 1 {
        return Err(DataError::InsufficientData {
            have: candles.len(),
            need: period + 1,
        });
    }

    let mut result = vec![f64::NAN; candles.len()];

    // Seed: arithmetic mean of the first `period` true ranges.
    let mut seed = 0.0;
    for i in 1..=period {
        seed += candles[i].true_range(candles[i - 1].close);
    }
    let mut value = seed / period as f64;
    result[period] = value;

    for i in period + 1..candles.len() {
        let tr = candles[i].true_range(candles[i - 1].close);
        value = (value * (period - 1) as f64 + tr) / period as f64;
        result[i] = value;
    }
    Ok(result)
}

/// Directional movement outputs. All vectors are input-length with leading
/// NaN; ADX warms up at `2 * period`.
pub struct AdxResult {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

/// Average Directional Index with Wilder smoothing of +DM/-DM/TR and of DX.
pub fn adx(candles: &[Candle], period: usize) -> Result<AdxResult, DataError> {
    if period == 0 || candles.len() < period * 2 + 1 {
        return Err(DataError::InsufficientData {
            have: candles.len(),
            need: period * 2 + 1,
        });
    }

    let n = candles.len();
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    let mut tr = vec![0.0; n];

    for i in 1..n {
        let up_move = candles[i].high - candles[i - 1].high;
        let down_move = candles[i - 1].low - candles[i].low;
        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
        tr[i] = candles[i].true_range(candles[i - 1].close);
    }

    let mut plus_di = vec![f64::NAN; n];
    let mut minus_di = vec![f64::NAN; n];
    let mut adx_out = vec![f64::NAN; n];

    // Wilder running sums over the first `period` movement values.
    let mut sm_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut sm_minus: f64 = minus_dm[1..=period].iter().sum();
    let mut sm_tr: f64 = tr[1..=period].iter().sum();

    let mut dx = vec![f64::NAN; n];
    for i in period..n {
        if i > period {
            sm_plus = sm_plus - sm_plus / period as f64 + plus_dm[i];
            sm_minus = sm_minus - sm_minus / period as f64 + minus_dm[i];
            sm_tr = sm_tr - sm_tr / period as f64 + tr[i];
        }
        let (pdi, mdi) = if sm_tr > 0.0 {
            (100.0 * sm_plus / sm_tr, 100.0 * sm_minus / sm_tr)
        } else {
            (0.0, 0.0)
        };
        plus_di[i] = pdi;
        minus_di[i] = mdi;
        let di_sum = pdi + mdi;
        dx[i] = if di_sum > 0.0 {
            100.0 * (pdi - mdi).abs() / di_sum
        } else {
            0.0
        };
    }

    // Smooth DX into ADX, seeded with the mean of the first `period` DX values.
    let first_adx_idx = 2 * period - 1;
    let mut value = dx[period..period + period].iter().sum::<f64>() / period as f64;
    adx_out[first_adx_idx] = value;
    for i in first_adx_idx + 1..n {
        value = (value * (period - 1) as f64 + dx[i]) / period as f64;
        adx_out[i] = value;
    }

    Ok(AdxResult {
        adx: adx_out,
        plus_di,
        minus_di,
    })
}

/// Position of the close within the Bollinger band, clamped to `[0, 1]`.
/// Zero-width bands map to 0.5. NaN until `period - 1`.
pub fn bollinger_position(
    data: &[f64],
    period: usize,
    std_dev: f64,
) -> Result<Vec<f64>, DataError> {
    if period == 0 || data.len() < period {
        return Err(DataError::InsufficientData {
            have: data.len(),
            need: period.max(1),
        });
    }

    let middle = sma(data, period)?;
    let mut result = vec![f64::NAN; data.len()];

    for i in period - 1..data.len() {
        let window = &data[i + 1 - period..=i];
        let mean = middle[i];
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();
        let upper = mean + std_dev * std;
        let lower = mean - std_dev * std;
        let width = upper - lower;
        result[i] = if width <= 0.0 {
            0.5
        } else {
            ((data[i] - lower) / width).clamp(0.0, 1.0)
        };
    }
    Ok(result)
}
