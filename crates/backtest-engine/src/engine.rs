use std::collections::BTreeMap;
use std::sync::Arc;

use decision_engine::{decide, BarState, DecisionState, RiskContext};
use feature_store::{AsOf, FeatureCache, FeatureStore};
use genesis_types::{
    Action, CandleSeries, ConfigError, DataError, ModeFlags, ReasonCode, Side,
};
use model_adapter::{ModelError, ProbabilityModel};
use regime::{classify_regime, score_confidence, QualityFactors};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::htf_exit::{evaluate_exits, ExitAction, ExitContext, SwingUpdatePolicy};
use crate::metrics::compute_metrics;
use crate::models::{BacktestInfo, BacktestParams, BacktestResult, RuntimeView, Summary};
use crate::tracker::PositionTracker;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("data: {0}")]
    Data(#[from] DataError),

    #[error("model: {0}")]
    Model(#[from] ModelError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("mode enforcement: {0}")]
    Mode(String),
}

/// Bar-by-bar backtest over one `(symbol, timeframe)` series. Owns its
/// tracker, feature store, and decision state; one instance per trial.
pub struct BacktestEngine {
    params: BacktestParams,
    runtime: RuntimeView,
    model: Box<dyn ProbabilityModel>,
    store: FeatureStore,
    htf: Option<CandleSeries>,
    mode: ModeFlags,
    risk_ctx: RiskContext,
}

impl BacktestEngine {
    pub fn new(
        params: BacktestParams,
        runtime: RuntimeView,
        model: Box<dyn ProbabilityModel>,
        mode: ModeFlags,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        let store = FeatureStore::new(runtime.features.clone()).with_htf_config(runtime.htf_swings);
        Ok(Self {
            params,
            runtime,
            model,
            store,
            htf: None,
            mode,
            risk_ctx: RiskContext::default(),
        })
    }

    /// Attach a verified precompute cache. Mode enforcement at `run` time
    /// requires one when `GENESIS_PRECOMPUTE_FEATURES=1`.
    pub fn with_feature_cache(mut self, cache: Arc<FeatureCache>) -> Self {
        self.store = FeatureStore::new(self.runtime.features.clone())
            .with_htf_config(self.runtime.htf_swings)
            .with_cache(cache);
        self
    }

    pub fn with_htf_series(mut self, htf: CandleSeries) -> Self {
        self.htf = Some(htf);
        self
    }

    pub fn with_risk_context(mut self, risk_ctx: RiskContext) -> Self {
        self.risk_ctx = risk_ctx;
        self
    }

    /// Fingerprint of the effective runtime view: canonical JSON, SHA-256,
    /// truncated. Persisted with results for drift auditing.
    pub fn config_fingerprint(&self) -> String {
        let canonical =
            serde_json::to_string(&self.runtime).expect("runtime view serializes");
        hex::encode(Sha256::digest(canonical.as_bytes()))[..16].to_string()
    }

    /// Run the backtest. Bars before `warmup` feed indicators only; every
    /// later bar goes through the full decide/exit/fill pipeline.
    pub fn run(&mut self, series: &CandleSeries) -> Result<BacktestResult, EngineError> {
        self.mode
            .check(self.store.has_cache())
            .map_err(EngineError::Mode)?;

        if series.symbol != self.params.symbol || series.timeframe != self.params.timeframe {
            return Err(EngineError::Config(ConfigError::InvalidValue {
                field: "symbol/timeframe".into(),
                message: format!(
                    "series is {}/{}, params want {}/{}",
                    series.symbol, series.timeframe, self.params.symbol, self.params.timeframe
                ),
            }));
        }

        let candles = series.candles();
        let warmup = self
            .params
            .warmup_bars
            .max(self.store.config().warmup_bars());
        if candles.len() <= warmup {
            return Err(EngineError::Data(DataError::InsufficientData {
                have: candles.len(),
                need: warmup + 1,
            }));
        }

        let htf_exits_enabled = self.runtime.htf_exit_config.enabled || self.mode.htf_exits;
        let mut tracker = PositionTracker::new(
            self.params.initial_capital,
            self.params.commission_rate,
            self.params.slippage_rate,
        )
        .with_scale_in(self.runtime.exit.allow_scale_in);
        let mut state = DecisionState::default();
        let mut reason_counts: BTreeMap<ReasonCode, usize> = BTreeMap::new();
        let mut cache_hits = 0usize;
        let mut cache_misses = 0usize;

        info!(
            symbol = %self.params.symbol,
            timeframe = %self.params.timeframe,
            bars = candles.len(),
            warmup,
            htf_exits = htf_exits_enabled,
            "backtest start"
        );

        for i in warmup..candles.len() {
            let candle = candles[i];
            let close = candle.close;
            let ts = candle.ts;

            // 1-2. AS-OF features for the visible window.
            let asof = AsOf {
                global_index: self
                    .mode
                    .fast_window
                    .then_some(self.params.window_start_idx + i),
                window_start_idx: self.params.window_start_idx,
            };
            let (features, meta) = self.store.extract(candles, i, &asof, self.htf.as_ref())?;
            if meta.cache_hit {
                cache_hits += 1;
            } else {
                cache_misses += 1;
            }

            // 3. Regime, probabilities, confidence.
            let market_regime = classify_regime(
                &features,
                self.store.config(),
                &meta.atr_percentiles,
                &self.runtime.regime,
            )?;
            let probas = self.model.predict(&features, market_regime)?;
            let quality = QualityFactors::from_window(&candles[..=i], &self.runtime.confidence);
            let confidence = score_confidence(&probas, &quality);

            // 4. Bar state snapshot.
            let current_atr = features.require(&self.store.config().atr_key())?;
            let bar_state = BarState {
                current_atr,
                atr_percentiles: &meta.atr_percentiles,
                htf_fib: &meta.htf_fibonacci,
                ltf_fib: &meta.ltf_fibonacci,
                last_close: close,
                equity: tracker.equity(close),
            };

            // 5. Gated decision.
            let decision = decide(
                Some(&probas),
                &confidence,
                market_regime,
                &state,
                &bar_state,
                &self.risk_ctx,
                &self.runtime.decision,
            );
            state = decision.state_out;
            for reason in &decision.reasons {
                *reason_counts.entry(*reason).or_insert(0) += 1;
                debug!(
                    component = "decision",
                    event = reason.as_str(),
                    bar = i,
                    "gate block"
                );
            }

            // 6. Exits on the open position.
            if tracker.position().is_some() {
                self.refresh_exit_context(&mut tracker, &meta.htf_fibonacci, current_atr);
                if htf_exits_enabled {
                    self.apply_htf_exits(&mut tracker, close, ts, current_atr);
                }
                self.apply_traditional_exits(&mut tracker, i, close, ts);
            }

            // 7. Entry.
            if decision.action != Action::None && decision.size > 0.0 {
                let entry_reasons = vec![
                    format!("conf={:.3}", confidence.overall),
                    format!("regime={}", market_regime.as_str()),
                    format!("p_buy={:.3}", probas.buy),
                    format!("p_sell={:.3}", probas.sell),
                ];
                let opened =
                    tracker.execute(decision.action, decision.size, close, ts, i, entry_reasons);
                if opened {
                    if htf_exits_enabled {
                        if let Some(pos) = tracker.position_mut() {
                            pos.exit_context =
                                ExitContext::freeze(&meta.htf_fibonacci, current_atr);
                        }
                    }
                    state.arm_cooldown(self.runtime.decision.gates.cooldown_bars);
                } else {
                    state.tick_cooldown();
                }
            } else {
                state.tick_cooldown();
            }

            // 8. Mark to market.
            tracker.mark(ts, close);
        }

        let last_close = candles[candles.len() - 1].close;
        let final_equity = tracker.equity(last_close);
        let metrics = compute_metrics(
            tracker.trades(),
            tracker.equity_curve(),
            self.params.initial_capital,
            tracker.total_commission(),
            self.params.timeframe,
        );

        info!(
            trades = tracker.trades().len(),
            final_equity,
            return_pct = metrics.total_return * 100.0,
            "backtest done"
        );

        Ok(BacktestResult {
            summary: Summary {
                symbol: self.params.symbol.clone(),
                timeframe: self.params.timeframe,
                bars_evaluated: candles.len() - warmup,
                initial_capital: self.params.initial_capital,
                final_equity,
                total_return_pct: metrics.total_return * 100.0,
                num_trades: tracker.trades().len(),
                status: "ok".to_string(),
            },
            trades: tracker.trades().to_vec(),
            equity_curve: tracker.equity_curve().to_vec(),
            metrics,
            backtest_info: BacktestInfo {
                config_fingerprint: self.config_fingerprint(),
                feature_fingerprint: self.store.config().fingerprint(),
                mode_flags: self.mode.clone(),
                htf_enabled: self.htf.is_some(),
                feature_cache_hits: cache_hits,
                feature_cache_misses: cache_misses,
                runtime_version: self.runtime.runtime_version.clone(),
                reason_counts,
            },
        })
    }

    /// Apply the swing-update policy to the frozen exit context.
    fn refresh_exit_context(
        &self,
        tracker: &mut PositionTracker,
        htf_fib: &genesis_types::FibContext,
        current_atr: f64,
    ) {
        let policy = self.runtime.htf_exit_config.swing_update;
        let change_pct = self.runtime.htf_exit_config.hybrid_atr_change_pct;
        let Some(pos) = tracker.position_mut() else {
            return;
        };
        let refresh = match (&pos.exit_context, policy) {
            (_, SwingUpdatePolicy::Fixed) => false,
            (_, SwingUpdatePolicy::Dynamic) => true,
            (Some(ctx), SwingUpdatePolicy::Hybrid) => {
                ctx.hybrid_refresh_due(current_atr, change_pct)
            }
            (None, SwingUpdatePolicy::Hybrid) => true,
        };
        if refresh {
            if let Some(fresh) = ExitContext::freeze(htf_fib, current_atr) {
                debug!(policy = ?policy, "exit context refreshed");
                pos.exit_context = Some(fresh);
            }
        }
    }

    fn apply_htf_exits(&self, tracker: &mut PositionTracker, close: f64, ts: i64, atr: f64) {
        let cfg = &self.runtime.htf_exit_config;
        let Some(pos) = tracker.position() else {
            return;
        };
        let Some(ctx) = pos.exit_context.clone() else {
            return;
        };

        let actions = evaluate_exits(pos, &ctx, close, atr, cfg);
        for action in actions {
            match action {
                ExitAction::TrailUpdate { new_stop } => {
                    if let Some(pos) = tracker.position_mut() {
                        pos.trail_stop = Some(new_stop);
                    }
                }
                ExitAction::Partial {
                    ratio,
                    fraction,
                    reason,
                } => {
                    tracker.close_partial(fraction, close, ts, &reason);
                    if let Some(pos) = tracker.position_mut() {
                        if let Some(ctx) = pos.exit_context.as_mut() {
                            ctx.levels_hit.push(ratio);
                        }
                    }
                }
                ExitAction::FullExit { reason } => {
                    tracker.close_full(close, ts, &reason);
                    return;
                }
            }
        }
    }

    fn apply_traditional_exits(
        &self,
        tracker: &mut PositionTracker,
        bar: usize,
        close: f64,
        ts: i64,
    ) {
        let exit = &self.runtime.exit;
        let Some(pos) = tracker.position() else {
            return;
        };
        let entry = pos.entry_price;
        let side = pos.side;
        let entry_bar = pos.entry_bar;

        if let Some(sl) = exit.stop_loss_pct {
            let hit = match side {
                Side::Long => close <= entry * (1.0 - sl),
                Side::Short => close >= entry * (1.0 + sl),
            };
            if hit {
                tracker.close_full(close, ts, "stop_loss");
                return;
            }
        }
        if let Some(tp) = exit.take_profit_pct {
            let hit = match side {
                Side::Long => close >= entry * (1.0 + tp),
                Side::Short => close <= entry * (1.0 - tp),
            };
            if hit {
                tracker.close_full(close, ts, "take_profit");
                return;
            }
        }
        if let Some(max_hold) = exit.max_hold_bars {
            if bar.saturating_sub(entry_bar) >= max_hold {
                tracker.close_full(close, ts, "max_hold");
            }
        }
    }
}
