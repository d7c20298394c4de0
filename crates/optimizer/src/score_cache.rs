use std::sync::atomic::{AtomicUsize, Ordering};

use config_authority::fingerprint;
use dashmap::DashMap;
use serde_json::Value;

/// Per-run score memo keyed by parameter fingerprint. Duplicate suggestions
/// return the cached score instead of re-running the backtest, and instead
/// of a punitive score that would poison the sampler's signal.
#[derive(Default)]
pub struct ScoreMemory {
    scores: DashMap<String, f64>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ScoreMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint for a suggested parameter value.
    pub fn param_fingerprint(params: &Value) -> String {
        fingerprint(params)
    }

    pub fn get(&self, fp: &str) -> Option<f64> {
        match self.scores.get(fp) {
            Some(score) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(*score)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, fp: String, score: f64) {
        self.scores.insert(fp, score);
    }

    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_fingerprint_returns_cached_score() {
        let memory = ScoreMemory::new();
        let params = json!({"thresholds": {"proba_base": 0.6}});
        let fp = ScoreMemory::param_fingerprint(&params);

        assert_eq!(memory.get(&fp), None);
        memory.insert(fp.clone(), 1.25);
        assert_eq!(memory.get(&fp), Some(1.25));
        assert_eq!(memory.get(&fp), Some(1.25));
        assert!((memory.hit_ratio() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn different_params_different_fingerprints() {
        let a = ScoreMemory::param_fingerprint(&json!({"x": 1.0}));
        let b = ScoreMemory::param_fingerprint(&json!({"x": 1.000001}));
        assert_ne!(a, b);
    }
}
