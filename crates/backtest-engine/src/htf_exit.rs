use genesis_types::{FibContext, Side};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tracker::Position;

/// When to refresh a position's frozen exit context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingUpdatePolicy {
    /// Never refresh: targets from open time stand for the whole trade.
    Fixed,
    /// Refresh from the live HTF context every bar.
    Dynamic,
    /// Refresh only when ATR has moved beyond `hybrid_atr_change_pct`.
    Hybrid,
}

/// HTF exit engine parameters (`htf_exit_config` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtfExitConfig {
    #[serde(default)]
    pub enabled: bool,
    /// A level counts as reached within `fib_threshold_atr * ATR`.
    #[serde(default = "default_fib_threshold_atr")]
    pub fib_threshold_atr: f64,
    /// `(ratio, fraction_of_position)` partial targets, checked in order.
    #[serde(default = "default_partial_levels")]
    pub partial_levels: Vec<(f64, f64)>,
    /// Reaching this ratio closes the remainder.
    #[serde(default = "default_terminal_level")]
    pub terminal_level: f64,
    #[serde(default = "default_trail_atr_multiplier")]
    pub trail_atr_multiplier: f64,
    #[serde(default = "default_swing_update")]
    pub swing_update: SwingUpdatePolicy,
    /// Relative ATR change that triggers a hybrid refresh.
    #[serde(default = "default_hybrid_atr_change_pct")]
    pub hybrid_atr_change_pct: f64,
}

fn default_fib_threshold_atr() -> f64 {
    0.5
}
fn default_partial_levels() -> Vec<(f64, f64)> {
    vec![(0.5, 0.33), (0.618, 0.5)]
}
fn default_terminal_level() -> f64 {
    0.786
}
fn default_trail_atr_multiplier() -> f64 {
    2.0
}
fn default_swing_update() -> SwingUpdatePolicy {
    SwingUpdatePolicy::Fixed
}
fn default_hybrid_atr_change_pct() -> f64 {
    0.2
}

impl Default for HtfExitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fib_threshold_atr: default_fib_threshold_atr(),
            partial_levels: default_partial_levels(),
            terminal_level: default_terminal_level(),
            trail_atr_multiplier: default_trail_atr_multiplier(),
            swing_update: default_swing_update(),
            hybrid_atr_change_pct: default_hybrid_atr_change_pct(),
        }
    }
}

/// Exit targets frozen onto a position at open time. Target prices are
/// direction-aware: a long advances from the swing low toward the swing
/// high, a short the other way, so "reaching 0.786" is always progress in
/// the trade's favour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitContext {
    pub swing_high: f64,
    pub swing_low: f64,
    /// ATR at freeze time, for the hybrid refresh policy.
    pub frozen_atr: f64,
    /// Partial target ratios already filled.
    pub levels_hit: Vec<f64>,
}

impl ExitContext {
    /// Freeze from an available fib context. `None` when the context is
    /// unavailable.
    pub fn freeze(ctx: &FibContext, atr: f64) -> Option<Self> {
        match ctx {
            FibContext::Available {
                swing_high,
                swing_low,
                ..
            } => Some(Self {
                swing_high: *swing_high,
                swing_low: *swing_low,
                frozen_atr: atr,
                levels_hit: Vec::new(),
            }),
            FibContext::Unavailable { .. } => None,
        }
    }

    /// Price of a ratio target in the trade's direction of progress.
    pub fn target_price(&self, ratio: f64, side: Side) -> f64 {
        let range = self.swing_high - self.swing_low;
        match side {
            Side::Long => self.swing_low + ratio * range,
            Side::Short => self.swing_high - ratio * range,
        }
    }

    /// Should a hybrid-policy position refresh now?
    pub fn hybrid_refresh_due(&self, current_atr: f64, change_pct: f64) -> bool {
        if self.frozen_atr <= 0.0 {
            return false;
        }
        ((current_atr - self.frozen_atr) / self.frozen_atr).abs() > change_pct
    }
}

/// One exit instruction produced for the current bar.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitAction {
    Partial {
        ratio: f64,
        fraction: f64,
        reason: String,
    },
    TrailUpdate {
        new_stop: f64,
    },
    FullExit {
        reason: String,
    },
}

/// Evaluate the frozen exit context against the current price. Returns zero
/// or more actions; a `FullExit` always comes last and makes any partials
/// before it moot.
pub fn evaluate_exits(
    position: &Position,
    ctx: &ExitContext,
    price: f64,
    atr: f64,
    cfg: &HtfExitConfig,
) -> Vec<ExitAction> {
    let mut actions = Vec::new();
    let side = position.side;
    let tolerance = cfg.fib_threshold_atr * atr;

    // Structure break: price falls out of the swing range against the trade.
    let broke = match side {
        Side::Long => price < ctx.swing_low - tolerance,
        Side::Short => price > ctx.swing_high + tolerance,
    };
    if broke {
        debug!(price, "structure break");
        actions.push(ExitAction::FullExit {
            reason: "structure_break".to_string(),
        });
        return actions;
    }

    // Trailing stop: advance with the peak-favourable price, fire on breach.
    let proposed_stop = match side {
        Side::Long => position.peak_favorable - cfg.trail_atr_multiplier * atr,
        Side::Short => position.peak_favorable + cfg.trail_atr_multiplier * atr,
    };
    match position.trail_stop {
        Some(stop) => {
            let breached = match side {
                Side::Long => price <= stop,
                Side::Short => price >= stop,
            };
            if breached {
                actions.push(ExitAction::FullExit {
                    reason: "trail_stop".to_string(),
                });
                return actions;
            }
            let improved = match side {
                Side::Long => proposed_stop > stop,
                Side::Short => proposed_stop < stop,
            };
            if improved {
                actions.push(ExitAction::TrailUpdate {
                    new_stop: proposed_stop,
                });
            }
        }
        None => {
            actions.push(ExitAction::TrailUpdate {
                new_stop: proposed_stop,
            });
        }
    }

    // Terminal target closes the remainder.
    let terminal = ctx.target_price(cfg.terminal_level, side);
    if reached(price, terminal, side, tolerance) {
        actions.push(ExitAction::FullExit {
            reason: format!("fib_{}", cfg.terminal_level),
        });
        return actions;
    }

    // Partial targets, each at most once per context.
    for &(ratio, fraction) in &cfg.partial_levels {
        if ctx.levels_hit.contains(&ratio) {
            continue;
        }
        let target = ctx.target_price(ratio, side);
        if reached(price, target, side, tolerance) {
            actions.push(ExitAction::Partial {
                ratio,
                fraction,
                reason: format!("fib_{ratio}"),
            });
        }
    }

    actions
}

/// A target is reached once price has progressed to within `tolerance` of
/// it (or beyond) in the trade's favourable direction.
fn reached(price: f64, target: f64, side: Side, tolerance: f64) -> bool {
    match side {
        Side::Long => price >= target - tolerance,
        Side::Short => price <= target + tolerance,
    }
}
