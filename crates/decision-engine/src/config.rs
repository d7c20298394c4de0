use std::collections::BTreeMap;

use feature_store::AtrZone;
use genesis_types::{or_default_f64, Regime};
use serde::{Deserialize, Serialize};

/// Base thresholds. Zone and regime deltas from `signal_adaptation` adjust
/// these per bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_proba_base")]
    pub proba_base: f64,
    #[serde(default = "default_conf_base")]
    pub conf_base: f64,
    /// Minimum |p_buy - p_sell|. An explicit `null` means 0.0 (no edge
    /// requirement), never an error.
    #[serde(default)]
    pub min_edge: Option<f64>,
}

fn default_proba_base() -> f64 {
    0.55
}
fn default_conf_base() -> f64 {
    0.50
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            proba_base: default_proba_base(),
            conf_base: default_conf_base(),
            min_edge: None,
        }
    }
}

impl Thresholds {
    pub fn min_edge(&self) -> f64 {
        or_default_f64(self.min_edge, 0.0)
    }
}

/// Per-gate enable flags. Fail-safe and EV are structural and cannot be
/// switched off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatesConfig {
    #[serde(default = "default_true")]
    pub regime_direction: bool,
    #[serde(default = "default_true")]
    pub proba_threshold: bool,
    #[serde(default = "default_true")]
    pub confidence: bool,
    #[serde(default = "default_true")]
    pub edge: bool,
    #[serde(default = "default_true")]
    pub hysteresis: bool,
    #[serde(default = "default_true")]
    pub cooldown: bool,
    #[serde(default = "default_hysteresis_steps")]
    pub hysteresis_steps: u32,
    #[serde(default = "default_cooldown_bars")]
    pub cooldown_bars: u32,
}

fn default_true() -> bool {
    true
}
fn default_hysteresis_steps() -> u32 {
    0
}
fn default_cooldown_bars() -> u32 {
    0
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            regime_direction: true,
            proba_threshold: true,
            confidence: true,
            edge: true,
            hysteresis: true,
            cooldown: true,
            hysteresis_steps: default_hysteresis_steps(),
            cooldown_bars: default_cooldown_bars(),
        }
    }
}

/// Expected-value gate parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvConfig {
    /// Reward ratio `R`; `null` falls back to the documented default.
    #[serde(default, rename = "R_default")]
    pub r_default: Option<f64>,
}

impl Default for EvConfig {
    fn default() -> Self {
        Self { r_default: None }
    }
}

impl EvConfig {
    pub fn r(&self) -> f64 {
        or_default_f64(self.r_default, 1.8)
    }
}

/// What to do when a required fib context is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Block the trade.
    Block,
    /// Let the trade through without the fib check.
    Allow,
}

/// Fibonacci proximity gate for one timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibGateConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Price must be within `tolerance_atr * ATR` of a target level.
    #[serde(default = "default_tolerance_atr")]
    pub tolerance_atr: f64,
    /// Which retracement ratios count as targets.
    #[serde(default = "default_target_levels")]
    pub target_levels: Vec<f64>,
    #[serde(default = "default_missing_policy")]
    pub missing_policy: MissingPolicy,
}

fn default_tolerance_atr() -> f64 {
    0.5
}
fn default_target_levels() -> Vec<f64> {
    vec![0.382, 0.5, 0.618, 0.786]
}
fn default_missing_policy() -> MissingPolicy {
    MissingPolicy::Block
}

impl Default for FibGateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tolerance_atr: default_tolerance_atr(),
            target_levels: default_target_levels(),
            missing_policy: default_missing_policy(),
        }
    }
}

/// Cross-timeframe arbitration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtfConfig {
    /// A strong LTF setup may override an HTF fib block.
    #[serde(default)]
    pub allow_ltf_override: bool,
    #[serde(default = "default_ltf_override_threshold")]
    pub ltf_override_threshold: f64,
}

fn default_ltf_override_threshold() -> f64 {
    0.75
}

impl Default for MtfConfig {
    fn default() -> Self {
        Self {
            allow_ltf_override: false,
            ltf_override_threshold: default_ltf_override_threshold(),
        }
    }
}

/// Position sizing: piecewise confidence -> size fraction, optional regime
/// and volatility-zone multipliers with a floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// `(confidence_threshold, size_pct)` pairs; the largest threshold at or
    /// below the overall confidence wins.
    #[serde(default = "default_risk_map")]
    pub risk_map: Vec<(f64, f64)>,
    /// Cap on the size fraction after multipliers.
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
    #[serde(default)]
    pub regime_multipliers: BTreeMap<Regime, f64>,
    #[serde(default)]
    pub zone_multipliers: BTreeMap<AtrZone, f64>,
    #[serde(default = "default_multiplier_floor")]
    pub multiplier_floor: f64,
}

fn default_risk_map() -> Vec<(f64, f64)> {
    vec![(0.0, 0.01), (0.55, 0.02), (0.70, 0.03), (0.85, 0.05)]
}
fn default_max_position_pct() -> f64 {
    0.10
}
fn default_multiplier_floor() -> f64 {
    0.25
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_map: default_risk_map(),
            max_position_pct: default_max_position_pct(),
            regime_multipliers: BTreeMap::new(),
            zone_multipliers: BTreeMap::new(),
            multiplier_floor: default_multiplier_floor(),
        }
    }
}

/// Additive threshold deltas keyed by regime and volatility zone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneDeltas {
    #[serde(default)]
    pub regime: BTreeMap<Regime, f64>,
    #[serde(default)]
    pub atr_zone: BTreeMap<AtrZone, f64>,
    /// Confidence-threshold deltas per regime.
    #[serde(default)]
    pub conf_regime: BTreeMap<Regime, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalAdaptation {
    #[serde(default)]
    pub zones: ZoneDeltas,
}

/// Direction policy per regime: which candidate directions survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionPolicy {
    Both,
    Long,
    Short,
    None,
}

impl Default for DirectionPolicy {
    fn default() -> Self {
        DirectionPolicy::Both
    }
}

/// Full decision-engine configuration, deserialized from the runtime SSOT
/// sections of the same names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionConfig {
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub gates: GatesConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub ev: EvConfig,
    #[serde(default)]
    pub multi_timeframe: MtfConfig,
    #[serde(default)]
    pub htf_fib: FibGateConfig,
    #[serde(default)]
    pub ltf_fib: FibGateConfig,
    #[serde(default)]
    pub signal_adaptation: SignalAdaptation,
    #[serde(default)]
    pub regime_policy: BTreeMap<Regime, DirectionPolicy>,
}

impl DecisionConfig {
    /// Probability threshold for the current regime and volatility zone.
    pub fn zone_threshold(&self, regime: Regime, zone: AtrZone) -> f64 {
        let deltas = &self.signal_adaptation.zones;
        let base = self.thresholds.proba_base;
        let r = deltas.regime.get(&regime).copied().unwrap_or(0.0);
        let z = deltas.atr_zone.get(&zone).copied().unwrap_or(0.0);
        (base + r + z).clamp(0.0, 1.0)
    }

    /// Confidence threshold for the current regime.
    pub fn conf_threshold(&self, regime: Regime) -> f64 {
        let delta = self
            .signal_adaptation
            .zones
            .conf_regime
            .get(&regime)
            .copied()
            .unwrap_or(0.0);
        (self.thresholds.conf_base + delta).clamp(0.0, 1.0)
    }

    pub fn direction_policy(&self, regime: Regime) -> DirectionPolicy {
        self.regime_policy.get(&regime).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_min_edge_defaults_to_zero() {
        let t: Thresholds = serde_json::from_str(r#"{"min_edge": null}"#).unwrap();
        assert_eq!(t.min_edge(), 0.0);
    }

    #[test]
    fn null_r_default_uses_documented_default() {
        let ev: EvConfig = serde_json::from_str(r#"{"R_default": null}"#).unwrap();
        assert_eq!(ev.r(), 1.8);
        let ev: EvConfig = serde_json::from_str(r#"{"R_default": 2.5}"#).unwrap();
        assert_eq!(ev.r(), 2.5);
    }

    #[test]
    fn zone_threshold_stacks_deltas() {
        let mut cfg = DecisionConfig::default();
        cfg.thresholds.proba_base = 0.55;
        cfg.signal_adaptation
            .zones
            .regime
            .insert(Regime::Bull, -0.05);
        cfg.signal_adaptation
            .zones
            .atr_zone
            .insert(AtrZone::High, 0.10);
        assert!((cfg.zone_threshold(Regime::Bull, AtrZone::High) - 0.60).abs() < 1e-12);
        assert!((cfg.zone_threshold(Regime::Bear, AtrZone::Normal) - 0.55).abs() < 1e-12);
    }
}
