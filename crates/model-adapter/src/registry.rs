use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use feature_store::FeatureVector;
use genesis_types::{Probas, Regime, Timeframe};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ModelError;
use crate::scorer::{probas_from_scores, LogisticScorer, ProbabilityModel, Scorer};

/// One registry entry. `regime: None` is the regime-agnostic fallback for
/// its `(symbol, timeframe)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub symbol: String,
    pub timeframe: Timeframe,
    #[serde(default)]
    pub regime: Option<Regime>,
    #[serde(flatten)]
    pub scorer: LogisticScorer,
}

/// Registry of trained scorers loaded from a JSON file.
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
    index: HashMap<(String, Timeframe, Option<Regime>), usize>,
}

impl ModelRegistry {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        #[derive(Deserialize)]
        struct RegistryFile {
            models: Vec<ModelEntry>,
        }
        let raw = std::fs::read_to_string(path)?;
        let file: RegistryFile = serde_json::from_str(&raw)?;
        Self::from_entries(file.models)
    }

    pub fn from_entries(entries: Vec<ModelEntry>) -> Result<Self, ModelError> {
        let mut index = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            entry
                .scorer
                .validate()
                .map_err(|message| ModelError::InvalidEntry {
                    symbol: entry.symbol.clone(),
                    timeframe: entry.timeframe.name().to_string(),
                    message,
                })?;
            index.insert((entry.symbol.clone(), entry.timeframe, entry.regime), i);
        }
        Ok(Self { entries, index })
    }

    /// Resolve the scorer for a key: regime-specific first, then the
    /// regime-agnostic entry.
    pub fn lookup(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        regime: Regime,
    ) -> Option<&ModelEntry> {
        self.index
            .get(&(symbol.to_string(), timeframe, Some(regime)))
            .or_else(|| self.index.get(&(symbol.to_string(), timeframe, None)))
            .map(|&i| &self.entries[i])
    }
}

/// A registry bound to one `(symbol, timeframe)` run. Unknown keys yield
/// NONE-signalling probabilities so the EV gate rejects every trade; a
/// schema mismatch is fatal because it means the feature pipeline and the
/// model disagree about the world.
pub struct RegistryModel {
    registry: Arc<ModelRegistry>,
    symbol: String,
    timeframe: Timeframe,
}

impl RegistryModel {
    pub fn new(registry: Arc<ModelRegistry>, symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            registry,
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl ProbabilityModel for RegistryModel {
    fn predict(&self, features: &FeatureVector, regime: Regime) -> Result<Probas, ModelError> {
        let Some(entry) = self.registry.lookup(&self.symbol, self.timeframe, regime) else {
            warn!(
                symbol = %self.symbol,
                timeframe = %self.timeframe,
                "no model registered, emitting NONE probabilities"
            );
            return Ok(Probas::none());
        };

        let mut inputs = Vec::with_capacity(entry.scorer.schema.len());
        for key in entry.scorer.schema() {
            let value = features
                .get(key)
                .filter(|v| v.is_finite())
                .ok_or_else(|| ModelError::SchemaMismatch(key.clone()))?;
            inputs.push(value);
        }

        let (buy, sell) = entry.scorer.score(&inputs);
        probas_from_scores(buy, sell, &self.symbol, self.timeframe.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(symbol: &str, regime: Option<Regime>, bias_buy: f64) -> ModelEntry {
        ModelEntry {
            symbol: symbol.to_string(),
            timeframe: Timeframe::Hour1,
            regime,
            scorer: LogisticScorer {
                schema: vec!["rsi_14".to_string()],
                weights_buy: vec![0.01],
                bias_buy,
                weights_sell: vec![-0.01],
                bias_sell: -1.0,
            },
        }
    }

    fn features() -> FeatureVector {
        let mut fv = FeatureVector::new();
        fv.insert("rsi_14", 55.0);
        fv
    }

    #[test]
    fn unknown_symbol_yields_none_probas() {
        let registry = Arc::new(ModelRegistry::from_entries(vec![entry("BTCUSD", None, 0.0)]).unwrap());
        let model = RegistryModel::new(registry, "ETHUSD", Timeframe::Hour1);
        let p = model.predict(&features(), Regime::Balanced).unwrap();
        assert_eq!(p, Probas::none());
    }

    #[test]
    fn regime_specific_entry_wins_over_fallback() {
        let registry = Arc::new(
            ModelRegistry::from_entries(vec![
                entry("BTCUSD", None, -5.0),
                entry("BTCUSD", Some(Regime::Bull), 5.0),
            ])
            .unwrap(),
        );
        let model = RegistryModel::new(registry, "BTCUSD", Timeframe::Hour1);
        let bull = model.predict(&features(), Regime::Bull).unwrap();
        let bear = model.predict(&features(), Regime::Bear).unwrap();
        assert!(bull.buy > 0.9);
        assert!(bear.buy < 0.1);
    }

    #[test]
    fn missing_schema_feature_is_fatal() {
        let registry = Arc::new(ModelRegistry::from_entries(vec![entry("BTCUSD", None, 0.0)]).unwrap());
        let model = RegistryModel::new(registry, "BTCUSD", Timeframe::Hour1);
        let empty = FeatureVector::new();
        let err = model.predict(&empty, Regime::Balanced).unwrap_err();
        assert!(matches!(err, ModelError::SchemaMismatch(_)));
    }

    #[test]
    fn mismatched_weight_count_rejected_at_load() {
        let mut bad = entry("BTCUSD", None, 0.0);
        bad.scorer.weights_buy = vec![0.1, 0.2];
        assert!(ModelRegistry::from_entries(vec![bad]).is_err());
    }
}
