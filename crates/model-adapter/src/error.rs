use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("registry io: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry parse: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("schema mismatch: feature `{0}` required by model but absent")]
    SchemaMismatch(String),

    #[error("model for {symbol}/{timeframe} produced non-finite output")]
    InvalidOutput { symbol: String, timeframe: String },

    #[error("model entry {symbol}/{timeframe}: {message}")]
    InvalidEntry {
        symbol: String,
        timeframe: String,
        message: String,
    },
}
