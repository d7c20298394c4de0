//! AS-OF feature extraction.
//!
//! Given a candle window and a "current" index, produces the feature vector
//! known strictly at or before that bar's close. Two paths exist: a slow path
//! that computes everything locally from the window, and a fast path that
//! reads precomputed columns by absolute bar index. Both honour the
//! configured indicator periods; both must agree bit-for-bit.

mod cache;
mod config;
mod extract;
mod percentiles;
mod vector;

pub use cache::FeatureCache;
pub use config::FeatureConfig;
pub use extract::{AsOf, FeatureMeta, FeatureStore};
pub use percentiles::{AtrPercentiles, AtrZone};
pub use vector::FeatureVector;
