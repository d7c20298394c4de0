use feature_store::AtrPercentiles;
use genesis_types::{Action, Confidence, FibContext, Probas, ReasonCode, Regime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DecisionConfig, DirectionPolicy, FibGateConfig, MissingPolicy};
use crate::sizing::select_size;
use crate::state::DecisionState;

/// Market snapshot assembled by the engine for one bar.
#[derive(Debug, Clone)]
pub struct BarState<'a> {
    pub current_atr: f64,
    pub atr_percentiles: &'a AtrPercentiles,
    pub htf_fib: &'a FibContext,
    pub ltf_fib: &'a FibContext,
    pub last_close: f64,
    pub equity: f64,
}

/// External risk flags injected from outside the core pipeline.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskContext {
    pub event_block: bool,
    pub risk_cap_exceeded: bool,
}

/// Decision for one bar. `reasons` is non-empty exactly when a gate blocked;
/// `state_out` is the post-decision hysteresis/cooldown state.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub size: f64,
    pub reasons: Vec<ReasonCode>,
    pub state_out: DecisionState,
}

impl Decision {
    fn blocked(reason: ReasonCode, state_out: DecisionState) -> Self {
        Self {
            action: Action::None,
            size: 0.0,
            reasons: vec![reason],
            state_out,
        }
    }
}

/// Run the gate pipeline. Deterministic and side-effect free: the same
/// snapshot and inputs always produce the same decision.
pub fn decide(
    probas: Option<&Probas>,
    confidence: &Confidence,
    regime: Regime,
    state: &DecisionState,
    bar: &BarState<'_>,
    risk: &RiskContext,
    cfg: &DecisionConfig,
) -> Decision {
    let mut state_out = *state;

    // 1. Fail-safe: missing or malformed probabilities.
    let Some(p) = probas.filter(|p| p.is_valid()) else {
        debug!(event = ReasonCode::FailSafeNull.as_str(), "gate block");
        return Decision::blocked(ReasonCode::FailSafeNull, state_out);
    };

    // 2. Expected value under the reward ratio, long and short evaluated
    //    symmetrically.
    let r = cfg.ev.r();
    let ev_long = p.buy * r - p.sell;
    let ev_short = p.sell * r - p.buy;
    if ev_long.max(ev_short) <= 0.0 {
        debug!(event = ReasonCode::EvNeg.as_str(), ev_long, ev_short, "gate block");
        return Decision::blocked(ReasonCode::EvNeg, state_out);
    }
    let candidate = if ev_long >= ev_short {
        Action::Long
    } else {
        Action::Short
    };

    // 3. External event block.
    if risk.event_block {
        return Decision::blocked(ReasonCode::REventBlock, state_out);
    }

    // 4. External risk cap.
    if risk.risk_cap_exceeded {
        return Decision::blocked(ReasonCode::RiskCap, state_out);
    }

    // 5. Regime direction policy.
    if cfg.gates.regime_direction {
        let allowed = match cfg.direction_policy(regime) {
            DirectionPolicy::Both => true,
            DirectionPolicy::Long => candidate == Action::Long,
            DirectionPolicy::Short => candidate == Action::Short,
            DirectionPolicy::None => false,
        };
        if !allowed {
            debug!(
                event = ReasonCode::RegimeDirBlock.as_str(),
                regime = regime.as_str(),
                "gate block"
            );
            return Decision::blocked(ReasonCode::RegimeDirBlock, state_out);
        }
    }

    // 6. Probability threshold for the regime/volatility zone.
    if cfg.gates.proba_threshold {
        let threshold = cfg.zone_threshold(regime, bar.atr_percentiles.zone());
        if p.buy.max(p.sell) < threshold {
            debug!(
                event = ReasonCode::ProbaThreshold.as_str(),
                threshold,
                "gate block"
            );
            return Decision::blocked(ReasonCode::ProbaThreshold, state_out);
        }
    }

    // 7. HTF Fibonacci proximity, with optional LTF override.
    if cfg.htf_fib.enabled {
        let htf_pass = fib_gate_passes(bar.htf_fib, bar.last_close, bar.current_atr, &cfg.htf_fib);
        if !htf_pass {
            let override_ok = cfg.multi_timeframe.allow_ltf_override
                && confidence.overall >= cfg.multi_timeframe.ltf_override_threshold
                && fib_gate_passes(bar.ltf_fib, bar.last_close, bar.current_atr, &cfg.ltf_fib);
            if !override_ok {
                let reason = match candidate {
                    Action::Short => ReasonCode::HtfFibShortBlock,
                    _ => ReasonCode::HtfFibLongBlock,
                };
                debug!(event = reason.as_str(), "gate block");
                return Decision::blocked(reason, state_out);
            }
        }
    }

    // 8. LTF Fibonacci proximity.
    if cfg.ltf_fib.enabled
        && !fib_gate_passes(bar.ltf_fib, bar.last_close, bar.current_atr, &cfg.ltf_fib)
    {
        debug!(event = ReasonCode::LtfFibBlock.as_str(), "gate block");
        return Decision::blocked(ReasonCode::LtfFibBlock, state_out);
    }

    // 9. Confidence threshold (>= passes).
    if cfg.gates.confidence {
        let threshold = cfg.conf_threshold(regime);
        if confidence.overall < threshold {
            debug!(
                event = ReasonCode::ConfTooLow.as_str(),
                overall = confidence.overall,
                threshold,
                "gate block"
            );
            return Decision::blocked(ReasonCode::ConfTooLow, state_out);
        }
    }

    // 10. Directional edge.
    if cfg.gates.edge && (p.buy - p.sell).abs() < cfg.thresholds.min_edge() {
        debug!(event = ReasonCode::EdgeTooSmall.as_str(), "gate block");
        return Decision::blocked(ReasonCode::EdgeTooSmall, state_out);
    }

    // 11. Hysteresis: switching direction needs consecutive confirmations.
    if cfg.gates.hysteresis
        && candidate != state_out.last_action
        && cfg.gates.hysteresis_steps > 1
    {
        if !state_out.confirm_switch(candidate, cfg.gates.hysteresis_steps) {
            debug!(
                event = ReasonCode::HystWait.as_str(),
                confirm_count = state_out.confirm_count,
                "gate block"
            );
            return Decision::blocked(ReasonCode::HystWait, state_out);
        }
    } else {
        state_out.commit(candidate);
    }

    // 12. Cooldown.
    if cfg.gates.cooldown && state_out.cooldown_remaining > 0 {
        debug!(
            event = ReasonCode::CooldownActive.as_str(),
            remaining = state_out.cooldown_remaining,
            "gate block"
        );
        return Decision::blocked(ReasonCode::CooldownActive, state_out);
    }

    let size = select_size(
        confidence.overall,
        regime,
        bar.atr_percentiles.zone(),
        bar.equity,
        &cfg.risk,
    );

    Decision {
        action: candidate,
        size,
        reasons: Vec::new(),
        state_out,
    }
}

/// Price proximity to any configured target level of an available context.
/// Unavailable contexts pass or block per the missing policy.
fn fib_gate_passes(ctx: &FibContext, price: f64, atr: f64, cfg: &FibGateConfig) -> bool {
    match ctx {
        FibContext::Unavailable { .. } => cfg.missing_policy == MissingPolicy::Allow,
        FibContext::Available {
            swing_high,
            swing_low,
            ..
        } => {
            let tolerance = cfg.tolerance_atr * atr;
            let diff = swing_high - swing_low;
            cfg.target_levels.iter().any(|ratio| {
                let level = swing_high - diff * ratio;
                (price - level).abs() <= tolerance
            })
        }
    }
}
