//! Indicator primitives: pure functions over OHLCV sequences.
//!
//! Every function returns a vector of the same length as its input, with
//! leading NaN until the warmup window is filled, so outputs align to bar
//! indices without offset bookkeeping. Callers that need a hard failure on
//! short inputs get `DataError::InsufficientData`.

mod indicators;
mod swings;


pub use indicators::{adx, atr, bollinger_position, ema, rsi, sma, AdxResult};
pub use swings::{swing_series, SwingPoint, SwingSeries};
