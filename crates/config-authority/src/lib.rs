//! Configuration authority: the runtime single source of truth.
//!
//! One persistent JSON file holds the runtime config; every mutation goes
//! through `propose_update` (whitelist validation, deep merge, atomic
//! replace, audit trail). Champion configs are merged under an explicit
//! strategy parameter so "skip the champion" is a visible decision at the
//! call site rather than a metadata sentinel acting at a distance.

mod authority;
mod champion;
mod fingerprint;
mod merge;
mod whitelist;

pub use authority::{ConfigAuthority, ConfigSnapshot};
pub use champion::{merge_for_evaluation, ChampionConfig, ChampionStore, MergeStrategy};
pub use fingerprint::{canonical_json, fingerprint};
pub use merge::deep_merge;
pub use whitelist::{validate_patch, EDITABLE_SECTIONS};
