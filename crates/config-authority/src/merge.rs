use serde_json::Value;

/// Recursive merge: objects merge key-by-key, everything else (scalars,
/// arrays, nulls) replaces the base value outright.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_objects_merge_recursively() {
        let mut base = json!({
            "thresholds": {"proba_base": 0.55, "conf_base": 0.5},
            "gates": {"cooldown_bars": 0}
        });
        deep_merge(&mut base, &json!({"thresholds": {"proba_base": 0.6}}));
        assert_eq!(base["thresholds"]["proba_base"], json!(0.6));
        assert_eq!(base["thresholds"]["conf_base"], json!(0.5));
        assert_eq!(base["gates"]["cooldown_bars"], json!(0));
    }

    #[test]
    fn arrays_and_scalars_replace() {
        let mut base = json!({"risk": {"risk_map": [[0.0, 0.01], [0.5, 0.02]]}});
        deep_merge(&mut base, &json!({"risk": {"risk_map": [[0.0, 0.03]]}}));
        assert_eq!(base["risk"]["risk_map"], json!([[0.0, 0.03]]));
    }

    #[test]
    fn explicit_null_replaces_value() {
        // A null in the patch survives the merge; typed readers map it to
        // the documented default at the point of use.
        let mut base = json!({"thresholds": {"min_edge": 0.05}});
        deep_merge(&mut base, &json!({"thresholds": {"min_edge": null}}));
        assert_eq!(base["thresholds"]["min_edge"], json!(null));
    }
}
