//! Core domain types shared by every Genesis crate: candles, decision
//! vocabulary, Fibonacci context, trade records, and the error taxonomy.

mod decision;
mod env;
mod error;
mod fib;
mod num;
mod timeframe;
mod types;

pub use decision::{Action, Confidence, Probas, ReasonCode, Regime, Side};
pub use env::ModeFlags;
pub use error::{ConfigError, DataError};
pub use fib::{FibContext, FibLevels, FibUnavailableReason};
pub use num::{finite_or, or_default_f64, or_default_usize};
pub use timeframe::Timeframe;
pub use types::{Candle, CandleSeries, EquitySnapshot, Trade};
