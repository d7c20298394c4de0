use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constraints::ConstraintConfig;

/// A leaf of the parameter space. Dotted keys address nested config fields
/// (`thresholds.proba_base`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamSpec {
    /// Pinned value, present in every trial.
    Fixed { value: Value },
    /// Uniform choice over an explicit list.
    Grid { values: Vec<Value> },
    /// Uniform float in `[low, high]`.
    Float { low: f64, high: f64 },
    /// Uniform integer in `[low, high]` inclusive.
    Int { low: i64, high: i64 },
    /// Log-uniform float in `[low, high]`, both positive.
    Loguniform { low: f64, high: f64 },
}

/// Champion promotion policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_min_improvement")]
    pub min_improvement: f64,
}

fn default_min_improvement() -> f64 {
    0.05
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_improvement: default_min_improvement(),
        }
    }
}

/// Validation stage: top-N explore trials re-run on a separate window under
/// stricter constraints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub top_n: usize,
    /// Fraction of the series (from the end) reserved for validation.
    #[serde(default = "default_validation_fraction")]
    pub window_fraction: f64,
    /// Stricter constraint overrides for the validation window.
    #[serde(default)]
    pub constraints: Option<ConstraintConfig>,
}

fn default_validation_fraction() -> f64 {
    0.25
}

/// Early-abort heuristic: probe a prefix of the window; a trial whose probe
/// shows zero trades is scored without a full run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_probe_fraction")]
    pub probe_fraction: f64,
}

fn default_probe_fraction() -> f64 {
    0.25
}

impl Default for AbortConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            probe_fraction: default_probe_fraction(),
        }
    }
}

/// The YAML search configuration for one study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub study_name: String,
    pub n_trials: usize,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Pinned backtest defaults file (capital, commission, slippage).
    pub backtest_defaults_file: PathBuf,
    /// Runtime defaults file the trial parameters merge into.
    pub runtime_defaults_file: PathBuf,
    pub parameters: BTreeMap<String, ParamSpec>,
    #[serde(default)]
    pub constraints: ConstraintConfig,
    #[serde(default)]
    pub promotion: PromotionConfig,
    #[serde(default)]
    pub validation: Option<ValidationConfig>,
    #[serde(default)]
    pub abort: AbortConfig,
}

impl SearchConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: SearchConfig = serde_yaml::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.study_name.is_empty() {
            anyhow::bail!("study_name must not be empty");
        }
        if self.n_trials == 0 {
            anyhow::bail!("n_trials must be positive");
        }
        for (key, spec) in &self.parameters {
            match spec {
                ParamSpec::Float { low, high } if low >= high => {
                    anyhow::bail!("parameter `{key}`: low {low} >= high {high}")
                }
                ParamSpec::Int { low, high } if low > high => {
                    anyhow::bail!("parameter `{key}`: low {low} > high {high}")
                }
                ParamSpec::Loguniform { low, high } if *low <= 0.0 || low >= high => {
                    anyhow::bail!("parameter `{key}`: loguniform needs 0 < low < high")
                }
                ParamSpec::Grid { values } if values.is_empty() => {
                    anyhow::bail!("parameter `{key}`: grid must not be empty")
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Pinned run economics. Commission is mandatory here for the same reason
/// it is mandatory on the engine: historical defaults disagree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestDefaults {
    pub capital: f64,
    pub commission: f64,
    #[serde(default)]
    pub slippage: f64,
    #[serde(default = "default_warmup_bars")]
    pub warmup_bars: usize,
}

fn default_warmup_bars() -> usize {
    100
}

impl BacktestDefaults {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
