use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use genesis_types::{ConfigError, Timeframe};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::authority::write_atomic;
use crate::fingerprint::fingerprint;
use crate::merge::deep_merge;

/// How caller config combines with the promoted champion. An explicit
/// parameter at every call site; optimizer trials always pass `Explicit` so
/// the search never folds the previous champion into a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// defaults <- champion <- overrides (normal evaluation path).
    ChampionOverlay,
    /// defaults <- overrides; the champion is ignored.
    Explicit,
}

/// A promoted parameter set for one `(symbol, timeframe)`, plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChampionConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub merged_config: Value,
    pub score: f64,
    pub num_trades: usize,
    pub runtime_version: u64,
    #[serde(default)]
    pub git_commit: Option<String>,
    pub fingerprint: String,
    pub promoted_at: String,
}

/// File-per-key champion store. Written only during promotion, with the
/// same atomic-replace discipline as the runtime SSOT.
pub struct ChampionStore {
    dir: PathBuf,
}

impl ChampionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir
            .join(format!("champion_{}_{}.json", symbol, timeframe.name()))
    }

    pub fn load(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<ChampionConfig>, ConfigError> {
        let path = self.path_for(symbol, timeframe);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Persist a new champion.
    pub fn save(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        merged_config: Value,
        score: f64,
        num_trades: usize,
        runtime_version: u64,
        git_commit: Option<String>,
    ) -> Result<ChampionConfig, ConfigError> {
        fs::create_dir_all(&self.dir)?;
        let champion = ChampionConfig {
            symbol: symbol.to_string(),
            timeframe,
            fingerprint: fingerprint(&merged_config),
            merged_config,
            score,
            num_trades,
            runtime_version,
            git_commit,
            promoted_at: Utc::now().to_rfc3339(),
        };
        let path = self.path_for(symbol, timeframe);
        write_atomic(&path, &serde_json::to_vec_pretty(&champion)?)?;
        info!(symbol, timeframe = %timeframe, score, "champion promoted");
        Ok(champion)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Build the effective config for an evaluation. Precedence:
/// overrides > champion > defaults, unless the strategy is `Explicit`, in
/// which case the champion layer is skipped entirely.
pub fn merge_for_evaluation(
    defaults: &Value,
    champion: Option<&ChampionConfig>,
    overrides: &Value,
    strategy: MergeStrategy,
) -> Value {
    let mut effective = defaults.clone();
    if strategy == MergeStrategy::ChampionOverlay {
        if let Some(champ) = champion {
            deep_merge(&mut effective, &champ.merged_config);
        }
    }
    deep_merge(&mut effective, overrides);
    effective
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn champion(dir: &TempDir) -> (ChampionStore, ChampionConfig) {
        let store = ChampionStore::new(dir.path().join("champions"));
        let champ = store
            .save(
                "BTCUSD",
                Timeframe::Hour1,
                json!({"thresholds": {"proba_base": 0.62}}),
                1.4,
                57,
                3,
                None,
            )
            .unwrap();
        (store, champ)
    }

    #[test]
    fn round_trip_through_store() {
        let dir = TempDir::new().unwrap();
        let (store, champ) = champion(&dir);
        let loaded = store.load("BTCUSD", Timeframe::Hour1).unwrap().unwrap();
        assert_eq!(loaded.fingerprint, champ.fingerprint);
        assert_eq!(loaded.merged_config, champ.merged_config);
        assert!(store.load("ETHUSD", Timeframe::Hour1).unwrap().is_none());
    }

    #[test]
    fn overlay_precedence_is_overrides_then_champion_then_defaults() {
        let dir = TempDir::new().unwrap();
        let (_, champ) = champion(&dir);
        let defaults = json!({
            "thresholds": {"proba_base": 0.55, "conf_base": 0.5},
            "gates": {"cooldown_bars": 0}
        });
        let overrides = json!({"gates": {"cooldown_bars": 7}});

        let effective = merge_for_evaluation(
            &defaults,
            Some(&champ),
            &overrides,
            MergeStrategy::ChampionOverlay,
        );
        assert_eq!(effective["thresholds"]["proba_base"], json!(0.62)); // champion
        assert_eq!(effective["thresholds"]["conf_base"], json!(0.5)); // defaults
        assert_eq!(effective["gates"]["cooldown_bars"], json!(7)); // overrides
    }

    #[test]
    fn explicit_strategy_ignores_champion_entirely() {
        // Invariant: under Explicit, the engine-observed config equals the
        // caller-supplied merge with no champion overlay.
        let dir = TempDir::new().unwrap();
        let (_, champ) = champion(&dir);
        let defaults = json!({"thresholds": {"proba_base": 0.55}});
        let overrides = json!({"thresholds": {"min_edge": 0.01}});

        let with_champion =
            merge_for_evaluation(&defaults, Some(&champ), &overrides, MergeStrategy::Explicit);
        let without_champion =
            merge_for_evaluation(&defaults, None, &overrides, MergeStrategy::Explicit);
        assert_eq!(with_champion, without_champion);
        assert_eq!(with_champion["thresholds"]["proba_base"], json!(0.55));
    }
}
