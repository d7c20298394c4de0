//! Backtest runner.
//!
//! Loads candles and the runtime config, applies the champion overlay
//! (unless skipped), runs one deterministic backtest, and writes the result
//! file. The `[SAVED] Results: <path>` line on stdout is the contract
//! downstream tools parse.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use backtest_engine::{BacktestEngine, BacktestParams, BacktestResult, RuntimeView};
use clap::Parser;
use config_authority::{merge_for_evaluation, ChampionStore, ConfigAuthority, MergeStrategy};
use feature_store::FeatureCache;
use genesis_cli::data::{load_candles, slice_range};
use genesis_types::{ModeFlags, Probas, Timeframe};
use model_adapter::{FixedModel, ModelRegistry, ProbabilityModel, RegistryModel};
use serde_json::Value;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "genesis-backtest", about = "Deterministic single backtest")]
struct Args {
    #[arg(long)]
    symbol: String,

    /// Timeframe (aliases like 60m or 1D normalise).
    #[arg(long)]
    timeframe: String,

    /// Candle file (JSON array or ts,open,high,low,close,volume CSV).
    #[arg(long)]
    candles: PathBuf,

    /// Higher-timeframe candle file for MTF context.
    #[arg(long)]
    htf_candles: Option<PathBuf>,

    /// Inclusive start timestamp (ms UTC).
    #[arg(long)]
    start: Option<i64>,

    /// Inclusive end timestamp (ms UTC).
    #[arg(long)]
    end: Option<i64>,

    #[arg(long, default_value_t = 100)]
    warmup: usize,

    /// Runtime config JSON (SSOT snapshot or trial config).
    #[arg(long)]
    config_file: PathBuf,

    #[arg(long)]
    capital: f64,

    /// Commission rate. Mandatory: there is no default.
    #[arg(long)]
    commission: f64,

    #[arg(long, default_value_t = 0.0)]
    slippage: f64,

    /// Model registry JSON; without it the run emits NONE probabilities.
    #[arg(long)]
    model_registry: Option<PathBuf>,

    /// Precomputed feature cache archive; verified against the run's
    /// symbol, timeframe, bar count, and feature config before use.
    #[arg(long)]
    feature_cache: Option<PathBuf>,

    /// Build the feature cache from the loaded candles, write it here, and
    /// use it for this run.
    #[arg(long)]
    write_feature_cache: Option<PathBuf>,

    /// Champion config directory for the overlay merge.
    #[arg(long)]
    champions_dir: Option<PathBuf>,

    /// Skip the champion overlay regardless of config metadata.
    #[arg(long, default_value_t = false)]
    no_champion_merge: bool,

    #[arg(long, default_value = "results/backtests")]
    out_dir: PathBuf,

    /// Optional equity-curve CSV export for notebook-side plotting.
    #[arg(long)]
    export_equity: Option<PathBuf>,
}

fn main() {
    dotenvy::dotenv().ok();
    genesis_cli::init_tracing();

    if let Err(e) = run() {
        error!(component = "backtest-runner", error = %e, "run failed");
        eprintln!("[FAILED] backtest-runner: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let timeframe: Timeframe = args
        .timeframe
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("parsing --timeframe")?;
    let mode = ModeFlags::from_env();

    let series = load_candles(&args.candles, &args.symbol, timeframe)?;
    let series = slice_range(&series, args.start, args.end)?;
    let htf = args
        .htf_candles
        .as_ref()
        .map(|path| load_candles(path, &args.symbol, Timeframe::Daily))
        .transpose()?;

    // Snapshot semantics: one read at entry, never re-read mid-run.
    let snapshot = ConfigAuthority::new(&args.config_file)
        .get()
        .with_context(|| format!("loading runtime config {}", args.config_file.display()))?;
    info!(fingerprint = %snapshot.fingerprint, version = snapshot.version, "runtime config loaded");
    let raw_config: Value = snapshot.config;

    // Champion precedence: config-embedded skip flag or the CLI flag turns
    // the overlay off; otherwise champion values sit between defaults and
    // any request-level overrides.
    let skip_champion = args.no_champion_merge
        || raw_config
            .pointer("/meta/skip_champion_merge")
            .and_then(Value::as_bool)
            .unwrap_or(false);
    let strategy = if skip_champion {
        MergeStrategy::Explicit
    } else {
        MergeStrategy::ChampionOverlay
    };
    let champion = match (&args.champions_dir, strategy) {
        (Some(dir), MergeStrategy::ChampionOverlay) => {
            ChampionStore::new(dir).load(&args.symbol, timeframe)?
        }
        _ => None,
    };
    let effective = merge_for_evaluation(
        &raw_config,
        champion.as_ref(),
        &Value::Object(Default::default()),
        strategy,
    );
    let runtime: RuntimeView =
        serde_json::from_value(effective).context("deserializing runtime config")?;

    let model: Box<dyn ProbabilityModel> = match &args.model_registry {
        Some(path) => {
            let registry = Arc::new(ModelRegistry::load(path)?);
            Box::new(RegistryModel::new(registry, &args.symbol, timeframe))
        }
        None => {
            warn!("no model registry given; emitting NONE probabilities");
            Box::new(FixedModel(Probas::none()))
        }
    };

    let params = BacktestParams {
        symbol: args.symbol.clone(),
        timeframe,
        initial_capital: args.capital,
        commission_rate: args.commission,
        slippage_rate: args.slippage,
        warmup_bars: args.warmup,
        window_start_idx: 0,
    };

    let mut engine = BacktestEngine::new(params, runtime.clone(), model, mode)?;
    if let Some(htf) = htf {
        engine = engine.with_htf_series(htf);
    }

    if let Some(path) = &args.write_feature_cache {
        let cache = FeatureCache::build(&series, &runtime.features)?;
        std::fs::write(path, serde_json::to_vec(&cache)?)?;
        info!(path = %path.display(), "feature cache written");
        engine = engine.with_feature_cache(Arc::new(cache));
    } else if let Some(path) = &args.feature_cache {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading feature cache {}", path.display()))?;
        let cache: FeatureCache = serde_json::from_str(&raw)?;
        cache.verify(&args.symbol, timeframe, series.len(), &runtime.features)?;
        engine = engine.with_feature_cache(Arc::new(cache));
    }

    std::fs::create_dir_all(&args.out_dir)?;
    let out_path = args.out_dir.join(format!(
        "backtest_{}_{}_{}.json",
        args.symbol,
        timeframe.name(),
        chrono::Utc::now().format("%Y%m%dT%H%M%SZ")
    ));

    let result = match engine.run(&series) {
        Ok(result) => result,
        Err(e) => {
            // Partial artefact so the failure is inspectable downstream.
            let partial = serde_json::json!({
                "status": "error",
                "error": e.to_string(),
                "symbol": args.symbol,
                "timeframe": timeframe.name(),
            });
            std::fs::write(&out_path, serde_json::to_vec_pretty(&partial)?)?;
            eprintln!("[FAILED] engine: {e} (partial results: {})", out_path.display());
            std::process::exit(1);
        }
    };

    std::fs::write(&out_path, serde_json::to_vec_pretty(&result)?)?;
    if let Some(equity_path) = &args.export_equity {
        export_equity_csv(&result, equity_path)?;
    }

    info!(
        trades = result.summary.num_trades,
        return_pct = result.summary.total_return_pct,
        "backtest finished"
    );
    println!("[SAVED] Results: {}", out_path.display());
    Ok(())
}

fn export_equity_csv(result: &BacktestResult, path: &PathBuf) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "ts,equity,unrealized_pnl,drawdown_pct")?;
    for snap in &result.equity_curve {
        writeln!(
            file,
            "{},{},{},{}",
            snap.ts, snap.equity, snap.unrealized_pnl, snap.drawdown_pct
        )?;
    }
    Ok(())
}
