use std::path::{Path, PathBuf};

use config_authority::fingerprint;
use genesis_types::ModeFlags;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::search_space::{BacktestDefaults, SearchConfig};

#[derive(Error, Debug)]
pub enum ResumeError {
    #[error(
        "study signature mismatch: stored {stored}, current {current} \
         (set GENESIS_ALLOW_STUDY_RESUME_MISMATCH=1 to override)"
    )]
    SignatureMismatch { stored: String, current: String },

    #[error("resume io: {0}")]
    Io(#[from] std::io::Error),

    #[error("resume parse: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Signature over everything that makes two study sessions comparable:
/// the parameter space, constraints, pinned backtest defaults, mode flags,
/// and a code-identifying digest. Stop-policy fields (`n_trials`,
/// `timeout_seconds`) are excluded so extending a study is not a mismatch.
pub fn resume_signature(
    search: &SearchConfig,
    defaults: &BacktestDefaults,
    mode: &ModeFlags,
) -> String {
    let identity = json!({
        "parameters": serde_json::to_value(&search.parameters).expect("parameters serialize"),
        "constraints": serde_json::to_value(&search.constraints).expect("constraints serialize"),
        "promotion": serde_json::to_value(&search.promotion).expect("promotion serializes"),
        "defaults": {
            "capital": defaults.capital,
            "commission": defaults.commission,
            "slippage": defaults.slippage,
        },
        "mode": {
            "fast_window": mode.fast_window,
            "precompute_features": mode.precompute_features,
            "random_seed": mode.random_seed,
        },
        "code": env!("CARGO_PKG_VERSION"),
    });
    fingerprint(&identity)
}

/// Guards a study directory against resuming with drifted config. The
/// signature is stored beside the trials on first run and compared on every
/// subsequent one.
pub struct ResumeGuard {
    path: PathBuf,
}

impl ResumeGuard {
    pub fn new(study_dir: &Path) -> Self {
        Self {
            path: study_dir.join("genesis_resume_signature.json"),
        }
    }

    /// Check (and on first run, record) the signature. A mismatch aborts
    /// unless the override flag is set.
    pub fn check(&self, current: &str, allow_mismatch: bool) -> Result<(), ResumeError> {
        if self.path.exists() {
            let raw = std::fs::read_to_string(&self.path)?;
            let stored: Value = serde_json::from_str(&raw)?;
            let stored_sig = stored
                .get("genesis_resume_signature")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            if stored_sig != current {
                if allow_mismatch {
                    warn!(
                        stored = %stored_sig,
                        current = %current,
                        "study signature mismatch overridden by env flag"
                    );
                    return Ok(());
                }
                return Err(ResumeError::SignatureMismatch {
                    stored: stored_sig,
                    current: current.to_string(),
                });
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let record = json!({ "genesis_resume_signature": current });
        std::fs::write(&self.path, serde_json::to_vec_pretty(&record)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search_space::ParamSpec;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn search() -> SearchConfig {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "thresholds.proba_base".to_string(),
            ParamSpec::Float {
                low: 0.4,
                high: 0.7,
            },
        );
        SearchConfig {
            study_name: "sig-test".to_string(),
            n_trials: 10,
            timeout_seconds: Some(60),
            backtest_defaults_file: PathBuf::new(),
            runtime_defaults_file: PathBuf::new(),
            parameters,
            constraints: Default::default(),
            promotion: Default::default(),
            validation: None,
            abort: Default::default(),
        }
    }

    fn defaults(commission: f64) -> BacktestDefaults {
        BacktestDefaults {
            capital: 10_000.0,
            commission,
            slippage: 0.0005,
            warmup_bars: 100,
        }
    }

    #[test]
    fn stop_policy_fields_do_not_change_signature() {
        let mut a = search();
        let sig_a = resume_signature(&a, &defaults(0.002), &ModeFlags::default());
        a.n_trials = 500;
        a.timeout_seconds = None;
        let sig_b = resume_signature(&a, &defaults(0.002), &ModeFlags::default());
        assert_eq!(sig_a, sig_b);
    }

    #[test]
    fn changed_commission_changes_signature_and_blocks_resume() {
        let dir = TempDir::new().unwrap();
        let guard = ResumeGuard::new(dir.path());
        let cfg = search();

        let first = resume_signature(&cfg, &defaults(0.002), &ModeFlags::default());
        guard.check(&first, false).unwrap();

        let second = resume_signature(&cfg, &defaults(0.001), &ModeFlags::default());
        assert_ne!(first, second);
        let err = guard.check(&second, false).unwrap_err();
        assert!(matches!(err, ResumeError::SignatureMismatch { .. }));

        // Explicit override lets the mismatched resume proceed.
        guard.check(&second, true).unwrap();
    }
}
