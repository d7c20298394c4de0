use serde::{Deserialize, Serialize};

/// The four canonical retracement levels between a swing low and swing high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibLevels {
    pub l_382: f64,
    pub l_500: f64,
    pub l_618: f64,
    pub l_786: f64,
}

impl FibLevels {
    /// Retracements measured down from the swing high.
    pub fn from_swing(swing_low: f64, swing_high: f64) -> Self {
        let diff = swing_high - swing_low;
        Self {
            l_382: swing_high - diff * 0.382,
            l_500: swing_high - diff * 0.500,
            l_618: swing_high - diff * 0.618,
            l_786: swing_high - diff * 0.786,
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.l_382, self.l_500, self.l_618, self.l_786]
    }

    pub fn all_finite(&self) -> bool {
        self.as_array().iter().all(|l| l.is_finite())
    }
}

/// Why a Fibonacci context could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FibUnavailableReason {
    MissingReferenceTs,
    TimeframeMissing,
    NotApplicable,
    LevelsIncomplete,
    InvalidSwingBounds,
    LevelsOutOfBounds,
}

/// Higher/lower-timeframe Fibonacci context at a reference timestamp.
///
/// `Available` guarantees: all four levels finite and within
/// `[swing_low, swing_high]`, and `swing_low < swing_high`. Construct through
/// [`FibContext::checked`] to enforce this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FibContext {
    Available {
        reference_ts: i64,
        swing_high: f64,
        swing_low: f64,
        levels: FibLevels,
        /// Timestamp of the source bar the swing was last computed from.
        last_update: i64,
    },
    Unavailable { reason: FibUnavailableReason },
}

impl FibContext {
    pub fn unavailable(reason: FibUnavailableReason) -> Self {
        FibContext::Unavailable { reason }
    }

    /// Validate swing bounds and level completeness; downgrade to
    /// `Unavailable` with the precise reason on any violation.
    pub fn checked(
        reference_ts: i64,
        swing_low: f64,
        swing_high: f64,
        levels: FibLevels,
        last_update: i64,
    ) -> Self {
        if !swing_low.is_finite() || !swing_high.is_finite() || swing_low >= swing_high {
            return Self::unavailable(FibUnavailableReason::InvalidSwingBounds);
        }
        if !levels.all_finite() {
            return Self::unavailable(FibUnavailableReason::LevelsIncomplete);
        }
        let in_bounds = levels
            .as_array()
            .iter()
            .all(|&l| l >= swing_low - 1e-9 && l <= swing_high + 1e-9);
        if !in_bounds {
            return Self::unavailable(FibUnavailableReason::LevelsOutOfBounds);
        }
        FibContext::Available {
            reference_ts,
            swing_high,
            swing_low,
            levels,
            last_update,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, FibContext::Available { .. })
    }

    pub fn levels(&self) -> Option<&FibLevels> {
        match self {
            FibContext::Available { levels, .. } => Some(levels),
            FibContext::Unavailable { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_accepts_valid_swing() {
        let levels = FibLevels::from_swing(90.0, 110.0);
        let ctx = FibContext::checked(1_700_000_000_000, 90.0, 110.0, levels, 1_700_000_000_000);
        assert!(ctx.is_available());
        let l = ctx.levels().unwrap();
        assert!((l.l_500 - 100.0).abs() < 1e-9);
        assert!(l.l_786 < l.l_618 && l.l_618 < l.l_500 && l.l_500 < l.l_382);
    }

    #[test]
    fn checked_rejects_inverted_swing() {
        let levels = FibLevels::from_swing(110.0, 90.0);
        let ctx = FibContext::checked(0, 110.0, 90.0, levels, 0);
        assert_eq!(
            ctx,
            FibContext::unavailable(FibUnavailableReason::InvalidSwingBounds)
        );
    }

    #[test]
    fn checked_rejects_out_of_bounds_levels() {
        let mut levels = FibLevels::from_swing(90.0, 110.0);
        levels.l_786 = 80.0; // below swing_low
        let ctx = FibContext::checked(0, 90.0, 110.0, levels, 0);
        assert_eq!(
            ctx,
            FibContext::unavailable(FibUnavailableReason::LevelsOutOfBounds)
        );
    }

    #[test]
    fn reason_serializes_screaming_snake() {
        let json = serde_json::to_string(&FibUnavailableReason::MissingReferenceTs).unwrap();
        assert_eq!(json, "\"MISSING_REFERENCE_TS\"");
    }
}
