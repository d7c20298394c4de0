use backtest_engine::Metrics;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constraints::ConstraintVerdict;

/// How a trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Ok,
    /// Duplicate parameter fingerprint; score served from memory.
    Duplicate,
    /// Abort heuristic fired before the full run.
    Pruned,
    /// The backtest raised; the study continues.
    Error,
}

/// One completed trial, serialized to `trial_NNN.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub number: usize,
    pub status: TrialStatus,
    pub params: Value,
    pub param_fingerprint: String,
    pub effective_config_fingerprint: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    pub constraints: ConstraintVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
