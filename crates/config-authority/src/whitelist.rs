use genesis_types::ConfigError;
use serde_json::Value;

/// Sections a runtime patch may touch. Known at compile time; anything else
/// is rejected before the merge runs.
pub const EDITABLE_SECTIONS: &[&str] = &[
    "thresholds",
    "gates",
    "risk",
    "ev",
    "multi_timeframe",
    "htf_fib",
    "ltf_fib",
    "htf_swings",
    "htf_exit_config",
    "exit",
    "features",
    "signal_adaptation",
    "regime_policy",
    "regime",
    "confidence",
    "meta",
];

/// Validate a patch against the whitelist: it must be an object, and every
/// top-level key must be an editable section.
pub fn validate_patch(patch: &Value) -> Result<(), ConfigError> {
    let Value::Object(map) = patch else {
        return Err(ConfigError::TypeMismatch {
            field: "<root>".to_string(),
            expected: "object",
            got: type_name(patch).to_string(),
        });
    };
    for (key, value) in map {
        if !EDITABLE_SECTIONS.contains(&key.as_str()) {
            return Err(ConfigError::NotWhitelisted { field: key.clone() });
        }
        // Sections are objects; a scalar where an object belongs is a shape
        // error, not a merge input.
        if !matches!(value, Value::Object(_)) {
            return Err(ConfigError::TypeMismatch {
                field: key.clone(),
                expected: "object",
                got: type_name(value).to_string(),
            });
        }
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn editable_section_passes() {
        assert!(validate_patch(&json!({"thresholds": {"proba_base": 0.6}})).is_ok());
    }

    #[test]
    fn unknown_section_is_rejected() {
        let err = validate_patch(&json!({"execution_venue": {"name": "x"}})).unwrap_err();
        assert!(matches!(err, ConfigError::NotWhitelisted { .. }));
    }

    #[test]
    fn scalar_section_is_a_type_error() {
        let err = validate_patch(&json!({"thresholds": 0.6})).unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }
}
