//! Deterministic bar-by-bar backtest engine.
//!
//! Orchestrates the per-bar pipeline (features -> probabilities ->
//! confidence/regime -> gated decision -> fill) over a validated candle
//! series, tracking positions, equity, and exits. Single-threaded by
//! design; parallelism belongs to the optimizer's trial level.

pub mod engine;
pub mod htf_exit;
pub mod metrics;
pub mod models;
pub mod scoring;
pub mod tracker;


pub use engine::{BacktestEngine, EngineError};
pub use htf_exit::{evaluate_exits, ExitAction, ExitContext, HtfExitConfig, SwingUpdatePolicy};
pub use metrics::{compute_metrics, Metrics};
pub use models::{BacktestInfo, BacktestParams, BacktestResult, ExitConfig, RuntimeView, Summary};
pub use scoring::{composite_score, ScoreVersion};
pub use tracker::{Position, PositionTracker};
