use feature_store::AtrZone;
use genesis_types::Regime;

use crate::config::RiskConfig;

/// Piecewise risk-map lookup: the largest confidence threshold at or below
/// `overall` selects the size fraction. Regime and volatility-zone
/// multipliers apply afterwards, floored so a stack of penalties cannot
/// zero a passing signal, and the final fraction is capped.
pub fn select_size(
    overall_confidence: f64,
    regime: Regime,
    zone: AtrZone,
    equity: f64,
    cfg: &RiskConfig,
) -> f64 {
    let mut entries: Vec<(f64, f64)> = cfg
        .risk_map
        .iter()
        .copied()
        .filter(|(t, _)| t.is_finite())
        .collect();
    entries.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("finite thresholds"));

    let mut size_pct = 0.0;
    for (threshold, pct) in entries {
        if overall_confidence >= threshold {
            size_pct = pct;
        } else {
            break;
        }
    }
    if size_pct <= 0.0 {
        return 0.0;
    }

    let regime_mult = cfg.regime_multipliers.get(&regime).copied().unwrap_or(1.0);
    let zone_mult = cfg.zone_multipliers.get(&zone).copied().unwrap_or(1.0);
    let multiplier = (regime_mult * zone_mult).max(cfg.multiplier_floor);

    let final_pct = (size_pct * multiplier).min(cfg.max_position_pct);
    (equity * final_pct).max(0.0)
}
