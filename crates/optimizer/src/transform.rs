use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

/// Confidence breakpoints the composed risk map is built over.
const RISK_MAP_BREAKPOINTS: [f64; 4] = [0.0, 0.55, 0.70, 0.85];

/// Expand a flat suggested parameter map into the nested runtime-config
/// shape, deriving composed fields along the way:
///
/// - dotted keys nest (`thresholds.proba_base` -> `{thresholds: {...}}`)
/// - `risk.risk_map_base` + `risk.risk_map_deltas` compose a monotonic
///   `risk.risk_map` over fixed confidence breakpoints; the raw inputs do
///   not survive into the output.
pub fn transform_parameters(flat: &BTreeMap<String, Value>) -> Value {
    let mut root = Value::Object(Map::new());

    let mut risk_map_base: Option<f64> = None;
    let mut risk_map_deltas: Option<Vec<f64>> = None;

    for (key, value) in flat {
        match key.as_str() {
            "risk.risk_map_base" => {
                risk_map_base = value.as_f64();
                continue;
            }
            "risk.risk_map_deltas" => {
                risk_map_deltas = value
                    .as_array()
                    .map(|a| a.iter().filter_map(Value::as_f64).collect());
                continue;
            }
            _ => {}
        }
        insert_dotted(&mut root, key, value.clone());
    }

    if let Some(base) = risk_map_base {
        let deltas = risk_map_deltas.unwrap_or_default();
        let mut size = base;
        let mut entries = Vec::with_capacity(RISK_MAP_BREAKPOINTS.len());
        for (i, threshold) in RISK_MAP_BREAKPOINTS.iter().enumerate() {
            if i > 0 {
                // Deltas are non-negative increments; missing entries hold
                // the previous size so the map stays monotonic.
                size += deltas.get(i - 1).copied().unwrap_or(0.0).max(0.0);
            }
            entries.push(json!([threshold, size]));
        }
        insert_dotted(&mut root, "risk.risk_map", Value::Array(entries));
    }

    root
}

fn insert_dotted(root: &mut Value, dotted: &str, value: Value) {
    let mut cursor = root;
    let parts: Vec<&str> = dotted.split('.').collect();
    for (i, part) in parts.iter().enumerate() {
        let map = cursor
            .as_object_mut()
            .expect("transform builds objects only");
        if i == parts.len() - 1 {
            map.insert((*part).to_string(), value);
            return;
        }
        cursor = map
            .entry((*part).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_keys_nest() {
        let mut flat = BTreeMap::new();
        flat.insert("thresholds.proba_base".to_string(), json!(0.6));
        flat.insert("gates.cooldown_bars".to_string(), json!(4));
        flat.insert(
            "signal_adaptation.zones.atr_zone.high".to_string(),
            json!(0.05),
        );

        let nested = transform_parameters(&flat);
        assert_eq!(nested["thresholds"]["proba_base"], json!(0.6));
        assert_eq!(nested["gates"]["cooldown_bars"], json!(4));
        assert_eq!(
            nested["signal_adaptation"]["zones"]["atr_zone"]["high"],
            json!(0.05)
        );
    }

    #[test]
    fn risk_map_composes_from_base_and_deltas() {
        let mut flat = BTreeMap::new();
        flat.insert("risk.risk_map_base".to_string(), json!(0.01));
        flat.insert(
            "risk.risk_map_deltas".to_string(),
            json!([0.01, 0.005, 0.02]),
        );

        let nested = transform_parameters(&flat);
        let map = nested["risk"]["risk_map"].as_array().unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map[0], json!([0.0, 0.01]));
        assert_eq!(map[1], json!([0.55, 0.02]));
        assert_eq!(map[2], json!([0.70, 0.025]));
        assert_eq!(map[3], json!([0.85, 0.045]));
        // Raw composition inputs are consumed.
        assert!(nested["risk"].get("risk_map_base").is_none());
        assert!(nested["risk"].get("risk_map_deltas").is_none());
    }

    #[test]
    fn negative_deltas_cannot_break_monotonicity() {
        let mut flat = BTreeMap::new();
        flat.insert("risk.risk_map_base".to_string(), json!(0.02));
        flat.insert("risk.risk_map_deltas".to_string(), json!([-0.01, 0.01]));

        let nested = transform_parameters(&flat);
        let map = nested["risk"]["risk_map"].as_array().unwrap();
        let sizes: Vec<f64> = map.iter().map(|e| e[1].as_f64().unwrap()).collect();
        assert!(sizes.windows(2).all(|w| w[1] >= w[0]));
    }
}
