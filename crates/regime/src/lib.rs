//! Regime classification and confidence scoring.
//!
//! Regime is a discrete label derived from EMA separation and the ATR
//! percentile rank; confidence multiplies raw model probabilities by data
//! quality factors. Both feed the decision engine's zone-specific gates.

mod classify;
mod confidence;

pub use classify::{classify_regime, RegimeConfig};
pub use confidence::{score_confidence, ConfidenceConfig, QualityFactors};
