//! Decision engine: the gate pipeline.
//!
//! A deterministic sequence of gates turns `(probas, confidence, regime,
//! state)` into `(action, size)`. The first gate to block fixes the result
//! and records its reason code; blocks are values, never errors. Given the
//! same state snapshot and inputs, `decide` always returns the same output.

mod config;
mod gates;
mod sizing;
mod state;

pub use config::{
    DecisionConfig, DirectionPolicy, EvConfig, FibGateConfig, GatesConfig, MissingPolicy,
    MtfConfig, RiskConfig, SignalAdaptation, Thresholds, ZoneDeltas,
};
pub use gates::{decide, BarState, Decision, RiskContext};
pub use sizing::select_size;
pub use state::DecisionState;
