use std::collections::BTreeMap;

use genesis_types::DataError;
use serde::{Deserialize, Serialize};

/// Mapping from feature key to a finite scalar. Backed by a `BTreeMap` so
/// iteration order (and therefore every derived fingerprint) is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    /// Fetch a key that the caller's schema requires; missing or non-finite
    /// values are fatal data errors, not silent defaults.
    pub fn require(&self, key: &str) -> Result<f64, DataError> {
        match self.0.get(key) {
            Some(v) if v.is_finite() => Ok(*v),
            _ => Err(DataError::MissingFeature(key.to_string())),
        }
    }

    /// Verify every listed key is present and finite.
    pub fn check_required(&self, keys: &[String]) -> Result<(), DataError> {
        for key in keys {
            self.require(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_nan_and_missing() {
        let mut fv = FeatureVector::new();
        fv.insert("rsi_14", 55.2);
        fv.insert("bad", f64::NAN);
        assert!(fv.require("rsi_14").is_ok());
        assert!(fv.require("bad").is_err());
        assert!(fv.require("absent").is_err());
    }
}
