use serde::{Deserialize, Serialize};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

/// Decision outcome for a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    None,
    Long,
    Short,
}

impl Action {
    pub fn side(&self) -> Option<Side> {
        match self {
            Action::None => None,
            Action::Long => Some(Side::Long),
            Action::Short => Some(Side::Short),
        }
    }
}

/// Why a gate blocked (or why no trade happened). Closed set; the serialized
/// form appears verbatim in decision logs and result files.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    FailSafeNull,
    EvNeg,
    REventBlock,
    RiskCap,
    RegimeDirBlock,
    ProbaThreshold,
    HtfFibLongBlock,
    HtfFibShortBlock,
    LtfFibBlock,
    ConfTooLow,
    EdgeTooSmall,
    HystWait,
    CooldownActive,
}

impl ReasonCode {
    /// The wire/log spelling, identical to the serde form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::FailSafeNull => "FAIL_SAFE_NULL",
            ReasonCode::EvNeg => "EV_NEG",
            ReasonCode::REventBlock => "R_EVENT_BLOCK",
            ReasonCode::RiskCap => "RISK_CAP",
            ReasonCode::RegimeDirBlock => "REGIME_DIR_BLOCK",
            ReasonCode::ProbaThreshold => "PROBA_THRESHOLD",
            ReasonCode::HtfFibLongBlock => "HTF_FIB_LONG_BLOCK",
            ReasonCode::HtfFibShortBlock => "HTF_FIB_SHORT_BLOCK",
            ReasonCode::LtfFibBlock => "LTF_FIB_BLOCK",
            ReasonCode::ConfTooLow => "CONF_TOO_LOW",
            ReasonCode::EdgeTooSmall => "EDGE_TOO_SMALL",
            ReasonCode::HystWait => "HYST_WAIT",
            ReasonCode::CooldownActive => "COOLDOWN_ACTIVE",
        }
    }
}

/// Directional probabilities from the model. `buy + sell <= 1`; the remainder
/// is the no-trade mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probas {
    pub buy: f64,
    pub sell: f64,
}

impl Probas {
    /// The NONE-signalling value returned for unknown models: both legs zero
    /// so the EV gate rejects every trade.
    pub fn none() -> Self {
        Self { buy: 0.0, sell: 0.0 }
    }

    pub fn is_valid(&self) -> bool {
        self.buy.is_finite()
            && self.sell.is_finite()
            && (0.0..=1.0).contains(&self.buy)
            && (0.0..=1.0).contains(&self.sell)
            && self.buy + self.sell <= 1.0 + 1e-9
    }
}

/// Confidence scores per direction plus the overall value used for gating
/// and sizing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub buy: f64,
    pub sell: f64,
    pub overall: f64,
}

impl Confidence {
    pub fn zero() -> Self {
        Self {
            buy: 0.0,
            sell: 0.0,
            overall: 0.0,
        }
    }
}

/// Discrete market regime used for zone-specific thresholds and direction
/// policy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Bull,
    Bear,
    Ranging,
    Balanced,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Bull => "bull",
            Regime::Bear => "bear",
            Regime::Ranging => "ranging",
            Regime::Balanced => "balanced",
        }
    }
}
