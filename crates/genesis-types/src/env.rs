use serde::{Deserialize, Serialize};

/// Environment-driven mode flags, read once per process. Canonical runs pin
/// these so results stay comparable across machines and over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeFlags {
    /// `GENESIS_FAST_WINDOW=1`: engine passes absolute indices to the
    /// feature store instead of re-deriving per window.
    pub fast_window: bool,
    /// `GENESIS_PRECOMPUTE_FEATURES=1`: a feature cache must be attached.
    pub precompute_features: bool,
    /// `GENESIS_MODE_EXPLICIT=1`: debug-only escape hatch that permits
    /// non-canonical flag combinations.
    pub mode_explicit: bool,
    /// `GENESIS_HTF_EXITS=1`: force-enable the HTF exit engine.
    pub htf_exits: bool,
    /// `GENESIS_RANDOM_SEED`: suggester seed, canonical value 42.
    pub random_seed: u64,
    /// `GENESIS_ALLOW_STUDY_RESUME_MISMATCH=1`: override the resume guard.
    pub allow_resume_mismatch: bool,
    /// `GENESIS_FAST_HASH=1`: non-deterministic hashing, forbidden in
    /// canonical mode.
    pub fast_hash: bool,
    /// `GENESIS_FORCE_SHELL=1`: run trial backtests as subprocesses.
    pub force_shell: bool,
    /// `GENESIS_MAX_CONCURRENT`: optimizer worker cap.
    pub max_concurrent: Option<usize>,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

impl ModeFlags {
    pub fn from_env() -> Self {
        Self {
            fast_window: env_flag("GENESIS_FAST_WINDOW"),
            precompute_features: env_flag("GENESIS_PRECOMPUTE_FEATURES"),
            mode_explicit: env_flag("GENESIS_MODE_EXPLICIT"),
            htf_exits: env_flag("GENESIS_HTF_EXITS"),
            random_seed: std::env::var("GENESIS_RANDOM_SEED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(42),
            allow_resume_mismatch: env_flag("GENESIS_ALLOW_STUDY_RESUME_MISMATCH"),
            fast_hash: env_flag("GENESIS_FAST_HASH"),
            force_shell: env_flag("GENESIS_FORCE_SHELL"),
            max_concurrent: std::env::var("GENESIS_MAX_CONCURRENT")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// The pinned canonical configuration.
    pub fn canonical() -> Self {
        Self {
            fast_window: true,
            precompute_features: true,
            mode_explicit: false,
            htf_exits: false,
            random_seed: 42,
            allow_resume_mismatch: false,
            fast_hash: false,
            force_shell: false,
            max_concurrent: None,
        }
    }

    /// Validate flag combinations. `fast_window` without a precompute cache
    /// is the classic silent-divergence setup; it is fatal unless the
    /// explicit escape hatch is set. `fast_hash` is never canonical.
    pub fn check(&self, has_cache: bool) -> Result<(), String> {
        if self.mode_explicit {
            return Ok(());
        }
        if self.fast_hash {
            return Err("GENESIS_FAST_HASH=1 is non-deterministic and forbidden in canonical mode".into());
        }
        if self.fast_window && !self.precompute_features {
            return Err(
                "GENESIS_FAST_WINDOW=1 requires GENESIS_PRECOMPUTE_FEATURES=1 (or GENESIS_MODE_EXPLICIT=1)".into(),
            );
        }
        if self.precompute_features && !has_cache {
            return Err("GENESIS_PRECOMPUTE_FEATURES=1 but no feature cache is attached".into());
        }
        Ok(())
    }
}

impl Default for ModeFlags {
    fn default() -> Self {
        Self {
            fast_window: false,
            precompute_features: false,
            mode_explicit: false,
            htf_exits: false,
            random_seed: 42,
            allow_resume_mismatch: false,
            fast_hash: false,
            force_shell: false,
            max_concurrent: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_window_without_precompute_is_fatal() {
        let flags = ModeFlags {
            fast_window: true,
            ..ModeFlags::default()
        };
        assert!(flags.check(false).is_err());
    }

    #[test]
    fn explicit_mode_permits_mismatches() {
        let flags = ModeFlags {
            fast_window: true,
            mode_explicit: true,
            ..ModeFlags::default()
        };
        assert!(flags.check(false).is_ok());
    }

    #[test]
    fn canonical_flags_pass_with_cache() {
        assert!(ModeFlags::canonical().check(true).is_ok());
        assert!(ModeFlags::canonical().check(false).is_err());
    }

    #[test]
    fn fast_hash_is_rejected() {
        let flags = ModeFlags {
            fast_hash: true,
            ..ModeFlags::default()
        };
        assert!(flags.check(true).is_err());
    }
}
