use std::collections::BTreeMap;

use decision_engine::DecisionConfig;
use feature_store::FeatureConfig;
use genesis_types::{ConfigError, EquitySnapshot, ModeFlags, ReasonCode, Timeframe, Trade};
use mtf_fib::MtfFibConfig;
use regime::{ConfidenceConfig, RegimeConfig};
use serde::{Deserialize, Serialize};

use crate::htf_exit::HtfExitConfig;
use crate::metrics::Metrics;

/// Run-level parameters. `commission_rate` is deliberately non-optional:
/// historical docs disagree on its default, so the engine refuses to run
/// without an explicit value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestParams {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub initial_capital: f64,
    pub commission_rate: f64,
    #[serde(default)]
    pub slippage_rate: f64,
    #[serde(default = "default_warmup_bars")]
    pub warmup_bars: usize,
    /// Bar index the run starts from in absolute history (0 = full history).
    #[serde(default)]
    pub window_start_idx: usize,
}

fn default_warmup_bars() -> usize {
    100
}

impl BacktestParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "initial_capital".into(),
                message: "must be a positive finite number".into(),
            });
        }
        if !(self.commission_rate.is_finite() && self.commission_rate >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "commission_rate".into(),
                message: "must be an explicit non-negative rate".into(),
            });
        }
        if !(self.slippage_rate.is_finite() && self.slippage_rate >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "slippage_rate".into(),
                message: "must be a non-negative rate".into(),
            });
        }
        Ok(())
    }
}

/// Traditional exit parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExitConfig {
    /// Stop loss as a fraction of entry price.
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    /// Take profit as a fraction of entry price.
    #[serde(default)]
    pub take_profit_pct: Option<f64>,
    /// Force-close after this many bars in position.
    #[serde(default)]
    pub max_hold_bars: Option<usize>,
    /// Same-side signals add to the position instead of being ignored.
    #[serde(default)]
    pub allow_scale_in: bool,
}

/// Typed view over the runtime SSOT sections the engine consumes. Unknown
/// sections are ignored here; the configuration authority validates them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeView {
    #[serde(flatten)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub htf_swings: MtfFibConfig,
    #[serde(default)]
    pub htf_exit_config: HtfExitConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub runtime_version: Option<String>,
}

/// High-level run outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars_evaluated: usize,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return_pct: f64,
    pub num_trades: usize,
    pub status: String,
}

/// Provenance block persisted with every result file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestInfo {
    pub config_fingerprint: String,
    pub feature_fingerprint: String,
    pub mode_flags: ModeFlags,
    pub htf_enabled: bool,
    pub feature_cache_hits: usize,
    pub feature_cache_misses: usize,
    pub runtime_version: Option<String>,
    /// Gate-dominance diagnostics: reason code -> occurrences.
    pub reason_counts: BTreeMap<ReasonCode, usize>,
}

/// Full backtest result, serialized to the output JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub summary: Summary,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquitySnapshot>,
    pub metrics: Metrics,
    pub backtest_info: BacktestInfo,
}
