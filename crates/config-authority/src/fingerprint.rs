use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonical JSON encoding: `serde_json`'s default `Value` map is ordered
/// by key, so serializing a round-tripped value is already canonical.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(value).expect("json value serializes")
}

/// SHA-256 over the canonical encoding, hex, truncated to 16 chars.
pub fn fingerprint(value: &Value) -> String {
    let canonical = canonical_json(value);
    hex::encode(Sha256::digest(canonical.as_bytes()))[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_key_order_independent() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let a = json!({"thresholds": {"proba_base": 0.55}});
        let b = json!({"thresholds": {"proba_base": 0.56}});
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 16);
    }
}
