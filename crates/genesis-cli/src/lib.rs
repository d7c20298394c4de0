//! Shared plumbing for the Genesis command-line runners: candle file
//! loading, logging setup, and result persistence.

pub mod data;

use tracing_subscriber::EnvFilter;

/// Install the process-wide subscriber. `RUST_LOG` wins; the default keeps
/// Genesis crates at info and everything else at warn.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,genesis=info".into()),
        )
        .init();
}
