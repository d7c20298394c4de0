use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use genesis_types::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::fingerprint::fingerprint;
use crate::merge::deep_merge;
use crate::whitelist::validate_patch;

/// A point-in-time read of the runtime SSOT. Readers take one snapshot on
/// entry and never observe mid-run changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub config: Value,
    pub fingerprint: String,
    pub version: u64,
}

/// Owner of the runtime SSOT file. Single writer; all mutations are
/// whitelist-validated, deep-merged, and atomically replaced, with an audit
/// line appended per update.
pub struct ConfigAuthority {
    path: PathBuf,
    audit_path: PathBuf,
}

impl ConfigAuthority {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let audit_path = path.with_extension("audit.jsonl");
        Self { path, audit_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current config, computing its fingerprint and version.
    pub fn get(&self) -> Result<ConfigSnapshot, ConfigError> {
        let raw = fs::read_to_string(&self.path)?;
        let config: Value = serde_json::from_str(&raw)?;
        let version = config
            .get("runtime_version")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(ConfigSnapshot {
            fingerprint: fingerprint(&config),
            config,
            version,
        })
    }

    /// Validate a patch without applying it.
    pub fn validate(&self, patch: &Value) -> Result<(), ConfigError> {
        validate_patch(&unwrap_patch(patch))
    }

    /// Apply a patch: unwrap `cfg`/`parameters` wrappers, validate against
    /// the whitelist, deep-merge, bump the version, write atomically, and
    /// append an audit entry. Returns the new snapshot.
    pub fn propose_update(&self, patch: &Value) -> Result<ConfigSnapshot, ConfigError> {
        let patch = unwrap_patch(patch);
        validate_patch(&patch)?;

        let current = self.get()?;
        let mut next = current.config.clone();
        deep_merge(&mut next, &patch);
        let version = current.version + 1;
        next["runtime_version"] = json!(version);

        let fp = fingerprint(&next);
        write_atomic(&self.path, &serde_json::to_vec_pretty(&next)?)?;

        let changed: Vec<&String> = patch.as_object().map(|m| m.keys().collect()).unwrap_or_default();
        let audit = json!({
            "ts": Utc::now().to_rfc3339(),
            "version": version,
            "fingerprint": fp,
            "sections": changed,
        });
        let mut audit_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_path)?;
        writeln!(audit_file, "{audit}")?;

        info!(version, fingerprint = %fp, "runtime config updated");
        Ok(ConfigSnapshot {
            config: next,
            fingerprint: fp,
            version,
        })
    }

    /// Seed the SSOT file if it does not exist yet.
    pub fn init_if_missing(&self, defaults: &Value) -> Result<(), ConfigError> {
        if self.path.exists() {
            return Ok(());
        }
        write_atomic(&self.path, &serde_json::to_vec_pretty(defaults)?)
    }
}

/// API callers wrap patches as `{"cfg": {...}}` or `{"parameters": {...}}`;
/// unwrap to the inner object when present.
fn unwrap_patch(patch: &Value) -> Value {
    for wrapper in ["cfg", "parameters"] {
        if let Some(inner) = patch.get(wrapper) {
            if patch.as_object().map(|m| m.len()) == Some(1) {
                return inner.clone();
            }
        }
    }
    patch.clone()
}

/// Write via temp file + rename so readers never see a torn file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConfigError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded_authority(dir: &TempDir) -> ConfigAuthority {
        let authority = ConfigAuthority::new(dir.path().join("runtime_config.json"));
        authority
            .init_if_missing(&json!({
                "runtime_version": 0,
                "thresholds": {"proba_base": 0.55, "min_edge": 0.02},
                "gates": {"cooldown_bars": 0}
            }))
            .unwrap();
        authority
    }

    #[test]
    fn update_merges_bumps_version_and_audits() {
        let dir = TempDir::new().unwrap();
        let authority = seeded_authority(&dir);

        let snap = authority
            .propose_update(&json!({"thresholds": {"proba_base": 0.6}}))
            .unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.config["thresholds"]["proba_base"], json!(0.6));
        assert_eq!(snap.config["thresholds"]["min_edge"], json!(0.02));

        let reread = authority.get().unwrap();
        assert_eq!(reread.fingerprint, snap.fingerprint);

        let audit = std::fs::read_to_string(dir.path().join("runtime_config.audit.jsonl")).unwrap();
        assert_eq!(audit.lines().count(), 1);
        assert!(audit.contains("\"version\":1"));
    }

    #[test]
    fn wrapped_patches_are_unwrapped() {
        let dir = TempDir::new().unwrap();
        let authority = seeded_authority(&dir);
        let snap = authority
            .propose_update(&json!({"cfg": {"gates": {"cooldown_bars": 5}}}))
            .unwrap();
        assert_eq!(snap.config["gates"]["cooldown_bars"], json!(5));
    }

    #[test]
    fn non_whitelisted_patch_is_rejected_and_file_untouched() {
        let dir = TempDir::new().unwrap();
        let authority = seeded_authority(&dir);
        let before = authority.get().unwrap();

        let err = authority
            .propose_update(&json!({"order_router": {"venue": "live"}}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotWhitelisted { .. }));

        let after = authority.get().unwrap();
        assert_eq!(before.fingerprint, after.fingerprint);
    }
}
