use thiserror::Error;

/// Fatal data errors: the run aborts rather than continuing on bad history.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("duplicate timestamp {ts} at index {index}")]
    DuplicateTimestamp { index: usize, ts: i64 },

    #[error("out-of-order timestamp {ts} at index {index}")]
    OutOfOrderTimestamp { index: usize, ts: i64 },

    #[error("non-finite OHLCV at index {index} (ts {ts})")]
    NonFiniteCandle { index: usize, ts: i64 },

    #[error("insufficient data: have {have} bars, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("required feature `{0}` is missing or non-finite")]
    MissingFeature(String),

    #[error("unknown timeframe `{0}`")]
    UnknownTimeframe(String),

    #[error("precompute cache mismatch: {0}")]
    CacheMismatch(String),
}

/// Fatal configuration errors: unknown field, whitelist failure, or a value
/// of the wrong shape.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown config field `{0}`")]
    UnknownField(String),

    #[error("field `{field}` is not editable")]
    NotWhitelisted { field: String },

    #[error("field `{field}`: expected {expected}, got `{got}`")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        got: String,
    },

    #[error("required field `{0}` is missing")]
    MissingRequired(String),

    #[error("invalid value for `{field}`: {message}")]
    InvalidValue { field: String, message: String },

    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}
