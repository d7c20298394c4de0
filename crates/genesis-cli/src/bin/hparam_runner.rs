//! Hyperparameter search runner.
//!
//! Takes a YAML search config, runs the explore stage (and validation when
//! configured), and writes the run directory under
//! `results/hparam_search/<run_id>/`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use config_authority::ChampionStore;
use genesis_cli::data::load_candles;
use genesis_types::{ModeFlags, Probas, Timeframe};
use model_adapter::{FixedModel, ModelRegistry, ProbabilityModel, RegistryModel};
use optimizer::{BacktestDefaults, ModelFactory, Optimizer, SearchConfig};
use serde_json::Value;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "genesis-hparam", about = "Hyperparameter study runner")]
struct Args {
    /// Search configuration YAML.
    search_config: PathBuf,

    #[arg(long)]
    symbol: String,

    #[arg(long)]
    timeframe: String,

    #[arg(long)]
    candles: PathBuf,

    #[arg(long)]
    htf_candles: Option<PathBuf>,

    #[arg(long)]
    model_registry: Option<PathBuf>,

    #[arg(long)]
    champions_dir: Option<PathBuf>,

    /// Run id; defaults to `<study_name>_<utc timestamp>`.
    #[arg(long)]
    run_id: Option<String>,

    #[arg(long, default_value = "results/hparam_search")]
    out_root: PathBuf,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    genesis_cli::init_tracing();

    if let Err(e) = run().await {
        error!(component = "hparam-runner", error = %e, "study failed");
        eprintln!("[FAILED] hparam-runner: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let timeframe: Timeframe = args
        .timeframe
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("parsing --timeframe")?;
    let mode = ModeFlags::from_env();

    let search = SearchConfig::load(&args.search_config)?;
    let defaults = BacktestDefaults::load(&search.backtest_defaults_file)?;
    let runtime_defaults: Value = serde_json::from_str(
        &std::fs::read_to_string(&search.runtime_defaults_file).with_context(|| {
            format!("reading {}", search.runtime_defaults_file.display())
        })?,
    )?;

    let series = load_candles(&args.candles, &args.symbol, timeframe)?;
    let htf = args
        .htf_candles
        .as_ref()
        .map(|path| load_candles(path, &args.symbol, Timeframe::Daily))
        .transpose()?;

    let model_factory: ModelFactory = match &args.model_registry {
        Some(path) => {
            let registry = Arc::new(ModelRegistry::load(path)?);
            let symbol = args.symbol.clone();
            Arc::new(move || {
                Box::new(RegistryModel::new(Arc::clone(&registry), &symbol, timeframe))
                    as Box<dyn ProbabilityModel>
            })
        }
        None => {
            warn!("no model registry given; trials will emit NONE probabilities");
            Arc::new(|| Box::new(FixedModel(Probas::none())) as Box<dyn ProbabilityModel>)
        }
    };

    let run_id = args.run_id.clone().unwrap_or_else(|| {
        format!(
            "{}_{}",
            search.study_name,
            chrono::Utc::now().format("%Y%m%dT%H%M%SZ")
        )
    });
    let run_dir = args.out_root.join(&run_id);
    let study_dir = args.out_root.join("studies").join(&search.study_name);

    info!(study = %search.study_name, run_id = %run_id, trials = search.n_trials, "study start");

    let mut optimizer = Optimizer::new(
        search,
        defaults,
        runtime_defaults,
        mode,
        series,
        htf,
        model_factory,
        study_dir,
        &run_dir,
    )
    .with_candles_file(&args.candles);
    if let Some(dir) = &args.champions_dir {
        optimizer = optimizer.with_champion_store(ChampionStore::new(dir));
    }

    let summary = optimizer.run().await?;
    info!(
        status = %summary.status,
        trials = summary.trials_completed,
        best_score = ?summary.best_score,
        duplicates = summary.duplicate_ratio,
        "study done"
    );
    println!("[SAVED] Run: {}", run_dir.display());
    Ok(())
}
