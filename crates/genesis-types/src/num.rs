//! Null-safe numeric config readers. A config value of `null` (deserialized
//! as `None`) or a non-finite number means "use the documented default" —
//! never a panic, never a silent zero.

/// Return `val` if it is finite, otherwise `default`.
#[inline]
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

/// Resolve an optional float config value: `None` and non-finite both map to
/// the default.
#[inline]
pub fn or_default_f64(val: Option<f64>, default: f64) -> f64 {
    match val {
        Some(v) if v.is_finite() => v,
        _ => default,
    }
}

/// Resolve an optional integer config value.
#[inline]
pub fn or_default_usize(val: Option<usize>, default: usize) -> usize {
    val.unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_maps_to_default_not_error() {
        assert_eq!(or_default_f64(None, 0.0), 0.0);
        assert_eq!(or_default_f64(Some(0.25), 0.0), 0.25);
        assert_eq!(or_default_f64(Some(f64::NAN), 0.5), 0.5);
        assert_eq!(or_default_usize(None, 3), 3);
    }
}
