use feature_store::FeatureVector;
use genesis_types::{Probas, Regime};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// An opaque scorer over a fixed input schema. Inputs arrive in schema
/// order; outputs are raw directional scores, mapped to probabilities by the
/// adapter.
pub trait Scorer: Send + Sync {
    fn schema(&self) -> &[String];
    fn score(&self, inputs: &[f64]) -> (f64, f64);
}

/// Two independent logistic heads sharing one input schema. This is the
/// serialized form trained models are exported in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticScorer {
    pub schema: Vec<String>,
    pub weights_buy: Vec<f64>,
    pub bias_buy: f64,
    pub weights_sell: Vec<f64>,
    pub bias_sell: f64,
}

impl LogisticScorer {
    pub fn validate(&self) -> Result<(), String> {
        if self.weights_buy.len() != self.schema.len() {
            return Err(format!(
                "buy head has {} weights for {} schema fields",
                self.weights_buy.len(),
                self.schema.len()
            ));
        }
        if self.weights_sell.len() != self.schema.len() {
            return Err(format!(
                "sell head has {} weights for {} schema fields",
                self.weights_sell.len(),
                self.schema.len()
            ));
        }
        let finite = self
            .weights_buy
            .iter()
            .chain(self.weights_sell.iter())
            .all(|w| w.is_finite())
            && self.bias_buy.is_finite()
            && self.bias_sell.is_finite();
        if !finite {
            return Err("non-finite weights".to_string());
        }
        Ok(())
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Scorer for LogisticScorer {
    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn score(&self, inputs: &[f64]) -> (f64, f64) {
        let dot = |weights: &[f64], bias: f64| {
            weights
                .iter()
                .zip(inputs)
                .fold(bias, |acc, (w, x)| acc + w * x)
        };
        (
            sigmoid(dot(&self.weights_buy, self.bias_buy)),
            sigmoid(dot(&self.weights_sell, self.bias_sell)),
        )
    }
}

/// The engine-facing model interface: feature vector in, probabilities out.
pub trait ProbabilityModel: Send + Sync {
    fn predict(&self, features: &FeatureVector, regime: Regime) -> Result<Probas, ModelError>;
}

/// Constant-output model for tests and dry runs.
pub struct FixedModel(pub Probas);

impl ProbabilityModel for FixedModel {
    fn predict(&self, _features: &FeatureVector, _regime: Regime) -> Result<Probas, ModelError> {
        Ok(self.0)
    }
}

/// Map two raw directional scores onto a valid `Probas`: clamp each leg to
/// `[0, 1]`, then rescale when the combined mass exceeds 1 so the remainder
/// stays the no-trade mass.
pub(crate) fn probas_from_scores(
    buy: f64,
    sell: f64,
    symbol: &str,
    timeframe: &str,
) -> Result<Probas, ModelError> {
    if !buy.is_finite() || !sell.is_finite() {
        return Err(ModelError::InvalidOutput {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
        });
    }
    let buy = buy.clamp(0.0, 1.0);
    let sell = sell.clamp(0.0, 1.0);
    let mass = buy + sell;
    if mass > 1.0 {
        Ok(Probas {
            buy: buy / mass,
            sell: sell / mass,
        })
    } else {
        Ok(Probas { buy, sell })
    }
}
