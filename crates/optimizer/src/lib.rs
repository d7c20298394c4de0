//! Hyperparameter optimizer.
//!
//! Suggests parameter sets from a YAML-declared search space, evaluates each
//! as an independent backtest trial, scores and constrains the results, and
//! promotes a champion when a study beats the incumbent by a margin. Trials
//! are memoised by parameter fingerprint, persisted to a study database
//! through a single writer task, and guarded against silent resume drift by
//! a study signature.

mod constraints;
mod resume;
mod runner;
mod score_cache;
mod search_space;
mod study_db;
mod suggest;
mod transform;
mod trial;

pub use constraints::{ConstraintConfig, ConstraintVerdict, HARD_FAILURE_SCORE, ZERO_TRADE_ABORT_SCORE};
pub use resume::{resume_signature, ResumeGuard};
pub use runner::{ModelFactory, Optimizer, OptimizerError, RunSummary};
pub use score_cache::ScoreMemory;
pub use search_space::{
    AbortConfig, BacktestDefaults, ParamSpec, PromotionConfig, SearchConfig, ValidationConfig,
};
pub use study_db::{StudyDb, StudyWriter, TrialRecord};
pub use suggest::Suggester;
pub use transform::transform_parameters;
pub use trial::{TrialOutcome, TrialStatus};
