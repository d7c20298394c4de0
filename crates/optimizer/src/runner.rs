use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use backtest_engine::{
    composite_score, BacktestEngine, BacktestParams, BacktestResult, RuntimeView, ScoreVersion,
};
use chrono::Utc;
use config_authority::{fingerprint, merge_for_evaluation, ChampionStore, MergeStrategy};
use genesis_types::{CandleSeries, ModeFlags};
use model_adapter::ProbabilityModel;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::constraints::{ConstraintConfig, HARD_FAILURE_SCORE, ZERO_TRADE_ABORT_SCORE};
use crate::resume::{resume_signature, ResumeError, ResumeGuard};
use crate::score_cache::ScoreMemory;
use crate::search_space::{BacktestDefaults, SearchConfig};
use crate::study_db::{StudyDb, StudyWriter, TrialRecord};
use crate::suggest::Suggester;
use crate::transform::transform_parameters;
use crate::trial::{TrialOutcome, TrialStatus};

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("resume guard: {0}")]
    Resume(#[from] ResumeError),

    #[error("study db: {0}")]
    Db(#[from] sqlx::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Factory producing one model per trial; each worker owns its model.
pub type ModelFactory = Arc<dyn Fn() -> Box<dyn ProbabilityModel> + Send + Sync>;

/// Summary persisted to `run_meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub study_name: String,
    pub status: String,
    pub trials_completed: usize,
    pub best_trial: Option<usize>,
    pub best_score: Option<f64>,
    pub duplicate_ratio: f64,
    pub pruned_ratio: f64,
    pub error_ratio: f64,
    pub zero_trade_ratio: f64,
    pub cache_hit_ratio: f64,
    pub wall_seconds: f64,
    pub genesis_resume_signature: String,
}

struct TrialContext {
    search: SearchConfig,
    defaults: BacktestDefaults,
    runtime_defaults: Value,
    mode: ModeFlags,
    series: Arc<CandleSeries>,
    htf: Option<Arc<CandleSeries>>,
    model_factory: ModelFactory,
    memory: ScoreMemory,
    /// On-disk candle file, required for `GENESIS_FORCE_SHELL` subprocess
    /// trials.
    candles_file: Option<PathBuf>,
    shell_work_dir: PathBuf,
}

/// Study orchestrator: suggests, evaluates, scores, constrains, persists,
/// and optionally promotes. One backtest per trial; each trial owns its
/// engine and tracker.
pub struct Optimizer {
    ctx: Arc<TrialContext>,
    study_dir: PathBuf,
    run_dir: PathBuf,
    champions: Option<ChampionStore>,
}

impl Optimizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        search: SearchConfig,
        defaults: BacktestDefaults,
        runtime_defaults: Value,
        mode: ModeFlags,
        series: CandleSeries,
        htf: Option<CandleSeries>,
        model_factory: ModelFactory,
        study_dir: impl Into<PathBuf>,
        run_dir: impl Into<PathBuf>,
    ) -> Self {
        let run_dir: PathBuf = run_dir.into();
        Self {
            ctx: Arc::new(TrialContext {
                search,
                defaults,
                runtime_defaults,
                mode,
                series: Arc::new(series),
                htf: htf.map(Arc::new),
                model_factory,
                memory: ScoreMemory::new(),
                candles_file: None,
                shell_work_dir: run_dir.clone(),
            }),
            study_dir: study_dir.into(),
            run_dir,
            champions: None,
        }
    }

    /// Point subprocess trials (`GENESIS_FORCE_SHELL=1`) at the on-disk
    /// candle file the series was loaded from.
    pub fn with_candles_file(mut self, path: impl Into<PathBuf>) -> Self {
        let ctx = Arc::get_mut(&mut self.ctx).expect("configure before running");
        ctx.candles_file = Some(path.into());
        self
    }

    pub fn with_champion_store(mut self, store: ChampionStore) -> Self {
        self.champions = Some(store);
        self
    }

    /// Run the explore stage (plus validation when configured) to
    /// completion or timeout. Completed trials are always persisted.
    pub async fn run(&self) -> Result<RunSummary, OptimizerError> {
        let ctx = &self.ctx;
        let started = Instant::now();
        std::fs::create_dir_all(&self.run_dir)?;

        // Resume safety first: a drifted study must not silently mix runs.
        let signature = resume_signature(&ctx.search, &ctx.defaults, &ctx.mode);
        ResumeGuard::new(&self.study_dir).check(&signature, ctx.mode.allow_resume_mismatch)?;

        let db = StudyDb::open(&self.study_dir.join("study.db")).await?;
        let writer = StudyWriter::spawn(db);

        // Pre-draw every parameter set from the seeded RNG so the suggested
        // sequence is independent of worker scheduling.
        let mut suggester = Suggester::new(ctx.mode.random_seed);
        let suggestions = suggester.suggest_all(&ctx.search);

        let mut outcomes: Vec<TrialOutcome> = Vec::with_capacity(suggestions.len());
        let mut best: Option<(usize, f64, Value)> = None;
        let mut status = "completed".to_string();

        // Trial-level worker pool: each worker owns its engine and tracker;
        // nothing mutable is shared across trials but the score memo.
        let workers = ctx.mode.max_concurrent.unwrap_or(1).max(1);
        let mut queue = suggestions.into_iter().enumerate();

        'study: loop {
            if let Some(timeout) = ctx.search.timeout_seconds {
                if started.elapsed().as_secs() >= timeout {
                    warn!(
                        completed = outcomes.len(),
                        "study timeout reached, stopping gracefully"
                    );
                    status = "timeout".to_string();
                    break 'study;
                }
            }

            let batch: Vec<(usize, BTreeMap<String, Value>)> =
                queue.by_ref().take(workers).collect();
            if batch.is_empty() {
                break 'study;
            }

            let mut handles = Vec::with_capacity(batch.len());
            for (number, flat) in batch {
                let ctx_clone = Arc::clone(ctx);
                handles.push(tokio::task::spawn_blocking(move || {
                    evaluate_trial(number, &flat, &ctx_clone)
                }));
            }

            for handle in handles {
                let (outcome, effective) = handle.await.expect("trial task never panics");

                self.persist_trial(&self.run_dir, &outcome, effective.as_ref())?;
                writer
                    .submit(TrialRecord {
                        study: ctx.search.study_name.clone(),
                        number: outcome.number as i64,
                        param_fingerprint: outcome.param_fingerprint.clone(),
                        status: status_str(outcome.status).to_string(),
                        score: outcome.score,
                        outcome_json: serde_json::to_string(&outcome)?,
                        created_at: Utc::now().to_rfc3339(),
                    })
                    .await;

                if outcome.status == TrialStatus::Ok
                    && outcome.constraints.hard_failures.is_empty()
                {
                    let better = best
                        .as_ref()
                        .map(|(_, s, _)| outcome.score > *s)
                        .unwrap_or(true);
                    if better {
                        if let Some(effective) = effective {
                            best = Some((outcome.number, outcome.score, effective));
                        }
                    }
                }
                outcomes.push(outcome);
            }
        }

        if let Some((number, score, effective)) = &best {
            self.maybe_promote(*number, *score, effective, &outcomes)?;
        }

        if let Some(validation) = ctx.search.validation.clone() {
            if validation.top_n > 0 && !outcomes.is_empty() {
                self.run_validation(&validation, &outcomes).await?;
            }
        }

        writer.shutdown().await;

        let summary = self.write_run_meta(&outcomes, &best, status, started, &signature)?;
        Ok(summary)
    }

    fn persist_trial(
        &self,
        dir: &Path,
        outcome: &TrialOutcome,
        effective: Option<&Value>,
    ) -> Result<(), OptimizerError> {
        let trial_path = dir.join(format!("trial_{:03}.json", outcome.number));
        std::fs::write(&trial_path, serde_json::to_vec_pretty(outcome)?)?;
        if let Some(effective) = effective {
            let config_path = dir.join(format!("trial_{:03}_config.json", outcome.number));
            std::fs::write(&config_path, serde_json::to_vec_pretty(effective)?)?;
        }
        Ok(())
    }

    fn maybe_promote(
        &self,
        number: usize,
        score: f64,
        effective: &Value,
        outcomes: &[TrialOutcome],
    ) -> Result<(), OptimizerError> {
        let promotion = &self.ctx.search.promotion;
        if !promotion.enabled {
            return Ok(());
        }
        let Some(store) = &self.champions else {
            return Ok(());
        };

        let symbol = self.ctx.series.symbol.clone();
        let timeframe = self.ctx.series.timeframe;
        let incumbent = store.load(&symbol, timeframe).ok().flatten();
        let bar = incumbent
            .as_ref()
            .map(|c| c.score + promotion.min_improvement)
            .unwrap_or(f64::NEG_INFINITY);
        if score <= bar {
            info!(score, bar, "best trial does not clear promotion bar");
            return Ok(());
        }

        let num_trades = outcomes
            .iter()
            .find(|o| o.number == number)
            .and_then(|o| o.metrics.as_ref())
            .map(|m| m.num_trades)
            .unwrap_or(0);
        let runtime_version = self
            .ctx
            .runtime_defaults
            .get("runtime_version")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        store
            .save(
                &symbol,
                timeframe,
                effective.clone(),
                score,
                num_trades,
                runtime_version,
                std::env::var("GENESIS_GIT_COMMIT").ok(),
            )
            .map_err(|e| OptimizerError::Io(std::io::Error::other(e.to_string())))?;
        Ok(())
    }

    async fn run_validation(
        &self,
        validation: &crate::search_space::ValidationConfig,
        outcomes: &[TrialOutcome],
    ) -> Result<(), OptimizerError> {
        let ctx = &self.ctx;
        let candles = ctx.series.candles();
        let split = candles.len()
            - ((candles.len() as f64 * validation.window_fraction) as usize).min(candles.len());
        let window = &candles[split..];
        let Ok(val_series) = CandleSeries::new(
            ctx.series.symbol.clone(),
            ctx.series.timeframe,
            window.to_vec(),
        ) else {
            return Ok(());
        };

        let mut ranked: Vec<&TrialOutcome> = outcomes
            .iter()
            .filter(|o| o.status == TrialStatus::Ok)
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let val_dir = self.run_dir.join("validation");
        std::fs::create_dir_all(&val_dir)?;
        let constraints = validation
            .constraints
            .clone()
            .unwrap_or_else(|| ctx.search.constraints.clone());

        for outcome in ranked.into_iter().take(validation.top_n) {
            let flat: BTreeMap<String, Value> = outcome
                .params
                .as_object()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();

            let ctx_clone = Arc::clone(ctx);
            let series = val_series.clone();
            let cons = constraints.clone();
            let number = outcome.number;
            let (val_outcome, effective) = tokio::task::spawn_blocking(move || {
                evaluate_on_series(number, &flat, &ctx_clone, &series, &cons, false)
            })
            .await
            .expect("validation task never panics");

            self.persist_trial(&val_dir, &val_outcome, effective.as_ref())?;
        }
        Ok(())
    }

    fn write_run_meta(
        &self,
        outcomes: &[TrialOutcome],
        best: &Option<(usize, f64, Value)>,
        status: String,
        started: Instant,
        signature: &str,
    ) -> Result<RunSummary, OptimizerError> {
        let total = outcomes.len().max(1) as f64;
        let count = |s: TrialStatus| outcomes.iter().filter(|o| o.status == s).count() as f64;
        let zero_trades = outcomes
            .iter()
            .filter(|o| {
                o.metrics
                    .as_ref()
                    .map(|m| m.num_trades == 0)
                    .unwrap_or(false)
            })
            .count() as f64;

        let summary = RunSummary {
            study_name: self.ctx.search.study_name.clone(),
            status,
            trials_completed: outcomes.len(),
            best_trial: best.as_ref().map(|(n, _, _)| *n),
            best_score: best.as_ref().map(|(_, s, _)| *s),
            duplicate_ratio: count(TrialStatus::Duplicate) / total,
            pruned_ratio: count(TrialStatus::Pruned) / total,
            error_ratio: count(TrialStatus::Error) / total,
            zero_trade_ratio: zero_trades / total,
            cache_hit_ratio: self.ctx.memory.hit_ratio(),
            wall_seconds: started.elapsed().as_secs_f64(),
            genesis_resume_signature: signature.to_string(),
        };
        std::fs::write(
            self.run_dir.join("run_meta.json"),
            serde_json::to_vec_pretty(&summary)?,
        )?;
        Ok(summary)
    }
}

fn status_str(status: TrialStatus) -> &'static str {
    match status {
        TrialStatus::Ok => "ok",
        TrialStatus::Duplicate => "duplicate",
        TrialStatus::Pruned => "pruned",
        TrialStatus::Error => "error",
    }
}

/// Evaluate one trial on the study's full explore window.
fn evaluate_trial(
    number: usize,
    flat: &BTreeMap<String, Value>,
    ctx: &TrialContext,
) -> (TrialOutcome, Option<Value>) {
    evaluate_on_series(
        number,
        flat,
        ctx,
        &ctx.series,
        &ctx.search.constraints,
        ctx.search.abort.enabled,
    )
}

/// Shared evaluation path for explore and validation windows.
fn evaluate_on_series(
    number: usize,
    flat: &BTreeMap<String, Value>,
    ctx: &TrialContext,
    series: &CandleSeries,
    constraints: &ConstraintConfig,
    abort_probe: bool,
) -> (TrialOutcome, Option<Value>) {
    let params_value = serde_json::to_value(flat).expect("flat params serialize");
    let param_fp = ScoreMemory::param_fingerprint(&params_value);

    // Duplicate suggestions return the memoised score so the sampler keeps
    // a consistent signal without paying for a second backtest.
    if let Some(score) = ctx.memory.get(&param_fp) {
        return (
            TrialOutcome {
                number,
                status: TrialStatus::Duplicate,
                params: params_value,
                param_fingerprint: param_fp,
                effective_config_fingerprint: String::new(),
                score,
                metrics: None,
                constraints: Default::default(),
                error: None,
            },
            None,
        );
    }

    // Trials never see the champion: Explicit merge, with the sentinel
    // recorded in the config for provenance.
    let nested = transform_parameters(flat);
    let mut effective = merge_for_evaluation(
        &ctx.runtime_defaults,
        None,
        &nested,
        MergeStrategy::Explicit,
    );
    effective["meta"] = json!({"skip_champion_merge": true});
    let effective_fp = fingerprint(&effective);

    let runtime: RuntimeView = match serde_json::from_value(effective.clone()) {
        Ok(view) => view,
        Err(e) => {
            let outcome = error_outcome(number, params_value, param_fp, effective_fp, e.to_string());
            return (outcome, Some(effective));
        }
    };

    // Optional early-abort probe on a prefix of the window: a parameter set
    // that cannot trade in the probe will not trade in the full window.
    if abort_probe {
        let probe_len = ((series.len() as f64) * ctx.search.abort.probe_fraction) as usize;
        if probe_len > ctx.defaults.warmup_bars + 1 {
            if let Ok(probe_series) = CandleSeries::new(
                series.symbol.clone(),
                series.timeframe,
                series.candles()[..probe_len].to_vec(),
            ) {
                if let Ok(result) = run_backtest(ctx, &runtime, &probe_series) {
                    if result.summary.num_trades == 0 {
                        ctx.memory.insert(param_fp.clone(), ZERO_TRADE_ABORT_SCORE);
                        return (
                            TrialOutcome {
                                number,
                                status: TrialStatus::Pruned,
                                params: params_value,
                                param_fingerprint: param_fp,
                                effective_config_fingerprint: effective_fp,
                                score: ZERO_TRADE_ABORT_SCORE,
                                metrics: Some(result.metrics),
                                constraints: Default::default(),
                                error: None,
                            },
                            Some(effective),
                        );
                    }
                }
            }
        }
    }

    let result = match run_backtest(ctx, &runtime, series) {
        Ok(result) => result,
        Err(e) => {
            let outcome = error_outcome(number, params_value, param_fp, effective_fp, e);
            return (outcome, Some(effective));
        }
    };

    let raw_score = composite_score(&result.metrics, ScoreVersion::V2);
    let (score, verdict) = constraints.apply(
        &result.metrics,
        ctx.defaults.capital,
        raw_score,
        &runtime.decision.risk.risk_map,
    );
    ctx.memory.insert(param_fp.clone(), score);

    (
        TrialOutcome {
            number,
            status: TrialStatus::Ok,
            params: params_value,
            param_fingerprint: param_fp,
            effective_config_fingerprint: effective_fp,
            score,
            metrics: Some(result.metrics),
            constraints: verdict,
            error: None,
        },
        Some(effective),
    )
}

fn error_outcome(
    number: usize,
    params: Value,
    param_fp: String,
    effective_fp: String,
    error: String,
) -> TrialOutcome {
    TrialOutcome {
        number,
        status: TrialStatus::Error,
        params,
        param_fingerprint: param_fp,
        effective_config_fingerprint: effective_fp,
        score: HARD_FAILURE_SCORE,
        metrics: None,
        constraints: Default::default(),
        error: Some(error),
    }
}

/// One backtest: in-process by default, or as a subprocess when
/// `GENESIS_FORCE_SHELL=1` isolates trials at the OS level.
fn run_backtest(
    ctx: &TrialContext,
    runtime: &RuntimeView,
    series: &CandleSeries,
) -> Result<BacktestResult, String> {
    if ctx.mode.force_shell {
        return run_backtest_shell(ctx, runtime, series);
    }
    let params = BacktestParams {
        symbol: series.symbol.clone(),
        timeframe: series.timeframe,
        initial_capital: ctx.defaults.capital,
        commission_rate: ctx.defaults.commission,
        slippage_rate: ctx.defaults.slippage,
        warmup_bars: ctx.defaults.warmup_bars,
        window_start_idx: 0,
    };
    let model = (ctx.model_factory)();
    let mut engine = BacktestEngine::new(params, runtime.clone(), model, ctx.mode.clone())
        .map_err(|e| e.to_string())?;
    if let Some(htf) = &ctx.htf {
        engine = engine.with_htf_series((**htf).clone());
    }
    engine.run(series).map_err(|e| e.to_string())
}

/// Spawn the backtest runner binary and parse its `[SAVED] Results: <path>`
/// marker line tolerantly (anything after the colon, trimmed).
fn run_backtest_shell(
    ctx: &TrialContext,
    runtime: &RuntimeView,
    series: &CandleSeries,
) -> Result<BacktestResult, String> {
    let candles_file = ctx
        .candles_file
        .as_ref()
        .ok_or("GENESIS_FORCE_SHELL=1 requires a candles file path")?;

    let config_path = ctx.shell_work_dir.join("shell_trial_config.json");
    let config_json =
        serde_json::to_vec_pretty(runtime).map_err(|e| format!("config serialize: {e}"))?;
    std::fs::write(&config_path, config_json).map_err(|e| format!("config write: {e}"))?;

    let binary =
        std::env::var("GENESIS_BACKTEST_BIN").unwrap_or_else(|_| "genesis-backtest".to_string());
    let output = std::process::Command::new(&binary)
        .arg("--symbol")
        .arg(&series.symbol)
        .arg("--timeframe")
        .arg(series.timeframe.name())
        .arg("--candles")
        .arg(candles_file)
        .arg("--config-file")
        .arg(&config_path)
        .arg("--capital")
        .arg(ctx.defaults.capital.to_string())
        .arg("--commission")
        .arg(ctx.defaults.commission.to_string())
        .arg("--slippage")
        .arg(ctx.defaults.slippage.to_string())
        .arg("--warmup")
        .arg(ctx.defaults.warmup_bars.to_string())
        .arg("--out-dir")
        .arg(&ctx.shell_work_dir)
        .output()
        .map_err(|e| format!("spawn {binary}: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "backtest subprocess exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let result_path = stdout
        .lines()
        .filter(|line| line.contains("[SAVED]"))
        .find_map(|line| line.splitn(2, ':').nth(1).map(|rest| rest.trim().to_string()))
        .ok_or("no [SAVED] Results marker in subprocess output")?;

    let raw = std::fs::read_to_string(&result_path)
        .map_err(|e| format!("read result {result_path}: {e}"))?;
    serde_json::from_str(&raw).map_err(|e| format!("parse result: {e}"))
}

#[cfg(test)]
mod runner_tests {
    use std::collections::BTreeMap;

    use genesis_types::{Candle, Probas, Timeframe};
    use model_adapter::FixedModel;
    use tempfile::TempDir;

    use super::*;
    use crate::search_space::ParamSpec;
    use crate::trial::TrialStatus;

    fn wave_series(n: usize) -> CandleSeries {
        let candles: Vec<Candle> = (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.15).sin() * 6.0;
                Candle {
                    ts: 1_700_000_000_000 + i as i64 * 3_600_000,
                    open: close,
                    high: close + 0.8,
                    low: close - 0.8,
                    close,
                    volume: 1000.0,
                }
            })
            .collect();
        CandleSeries::new("BTCUSD", Timeframe::Hour1, candles).unwrap()
    }

    fn runtime_defaults() -> Value {
        json!({
            "runtime_version": 1,
            "thresholds": {"proba_base": 0.0, "conf_base": 0.0},
            "risk": {"risk_map": [[0.0, 0.02]], "max_position_pct": 0.05},
            "exit": {"max_hold_bars": 3}
        })
    }

    fn search(n_trials: usize) -> SearchConfig {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "thresholds.proba_base".to_string(),
            ParamSpec::Fixed { value: json!(0.0) },
        );
        SearchConfig {
            study_name: "runner-test".to_string(),
            n_trials,
            timeout_seconds: None,
            backtest_defaults_file: PathBuf::new(),
            runtime_defaults_file: PathBuf::new(),
            parameters,
            constraints: ConstraintConfig {
                min_trades: 1,
                min_profit_factor: 0.0,
                max_max_dd: 1.0,
                ..Default::default()
            },
            promotion: crate::search_space::PromotionConfig {
                enabled: true,
                min_improvement: 0.0,
            },
            validation: None,
            abort: Default::default(),
        }
    }

    fn defaults() -> BacktestDefaults {
        BacktestDefaults {
            capital: 10_000.0,
            commission: 0.002,
            slippage: 0.0005,
            warmup_bars: 60,
        }
    }

    fn factory() -> ModelFactory {
        Arc::new(|| {
            Box::new(FixedModel(Probas {
                buy: 0.9,
                sell: 0.05,
            }))
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn duplicate_trials_reuse_cached_score_without_rerun() {
        let dir = TempDir::new().unwrap();
        let optimizer = Optimizer::new(
            search(4),
            defaults(),
            runtime_defaults(),
            ModeFlags::default(),
            wave_series(300),
            None,
            factory(),
            dir.path().join("study"),
            dir.path().join("run"),
        );

        let summary = optimizer.run().await.unwrap();
        assert_eq!(summary.trials_completed, 4);
        // One real evaluation, three fingerprint hits.
        assert!((summary.duplicate_ratio - 0.75).abs() < 1e-12);

        let first: TrialOutcome = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("run/trial_000.json")).unwrap(),
        )
        .unwrap();
        let second: TrialOutcome = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("run/trial_001.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(first.status, TrialStatus::Ok);
        assert_eq!(second.status, TrialStatus::Duplicate);
        assert_eq!(first.score, second.score);
        assert_eq!(first.param_fingerprint, second.param_fingerprint);

        // Study database holds every trial.
        let db = StudyDb::open(&dir.path().join("study/study.db")).await.unwrap();
        assert_eq!(db.trial_count("runner-test").await.unwrap(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn promotion_writes_champion_file() {
        let dir = TempDir::new().unwrap();
        let store = ChampionStore::new(dir.path().join("champions"));
        let optimizer = Optimizer::new(
            search(2),
            defaults(),
            runtime_defaults(),
            ModeFlags::default(),
            wave_series(300),
            None,
            factory(),
            dir.path().join("study"),
            dir.path().join("run"),
        )
        .with_champion_store(store);

        let summary = optimizer.run().await.unwrap();
        assert!(summary.best_score.is_some());

        let store = ChampionStore::new(dir.path().join("champions"));
        let champion = store.load("BTCUSD", Timeframe::Hour1).unwrap().unwrap();
        assert_eq!(champion.score, summary.best_score.unwrap());
        assert_eq!(
            champion.merged_config["meta"]["skip_champion_merge"],
            json!(true)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn changed_defaults_abort_resumed_study() {
        let dir = TempDir::new().unwrap();
        let study_dir = dir.path().join("study");

        let first = Optimizer::new(
            search(1),
            defaults(),
            runtime_defaults(),
            ModeFlags::default(),
            wave_series(300),
            None,
            factory(),
            &study_dir,
            dir.path().join("run1"),
        );
        first.run().await.unwrap();

        let mut drifted = defaults();
        drifted.commission = 0.001;
        let second = Optimizer::new(
            search(1),
            drifted,
            runtime_defaults(),
            ModeFlags::default(),
            wave_series(300),
            None,
            factory(),
            &study_dir,
            dir.path().join("run2"),
        );
        let err = second.run().await.unwrap_err();
        assert!(err.to_string().contains("signature mismatch"));
    }
}
