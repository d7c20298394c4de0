use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Supported trading timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1-minute bars
    Min1,
    /// 5-minute bars
    Min5,
    /// 15-minute bars
    Min15,
    /// 1-hour bars
    Hour1,
    /// 4-hour bars
    Hour4,
    /// Daily bars
    Daily,
}

impl Timeframe {
    /// Canonical name used in file paths, registries, and fingerprints.
    pub fn name(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Daily => "1d",
        }
    }

    /// Duration of one bar in milliseconds.
    pub fn bar_ms(&self) -> i64 {
        match self {
            Timeframe::Min1 => 60_000,
            Timeframe::Min5 => 300_000,
            Timeframe::Min15 => 900_000,
            Timeframe::Hour1 => 3_600_000,
            Timeframe::Hour4 => 14_400_000,
            Timeframe::Daily => 86_400_000,
        }
    }

    /// Bars per year for annualised metrics (crypto convention, 24/7 market).
    pub fn bars_per_year(&self) -> f64 {
        (365.0 * 86_400_000.0) / self.bar_ms() as f64
    }
}

impl FromStr for Timeframe {
    type Err = DataError;

    /// Parse a timeframe, normalising the aliases seen in configs and data
    /// feeds (`60m` -> 1h, `1D`/`D`/`daily` -> 1d, `240m` -> 4h).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(Timeframe::Min1),
            "5m" => Ok(Timeframe::Min5),
            "15m" => Ok(Timeframe::Min15),
            "1h" | "60m" => Ok(Timeframe::Hour1),
            "4h" | "240m" => Ok(Timeframe::Hour4),
            "1d" | "d" | "daily" => Ok(Timeframe::Daily),
            other => Err(DataError::UnknownTimeframe(other.to_string())),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_normalise() {
        assert_eq!("60m".parse::<Timeframe>().unwrap(), Timeframe::Hour1);
        assert_eq!("1D".parse::<Timeframe>().unwrap(), Timeframe::Daily);
        assert_eq!("daily".parse::<Timeframe>().unwrap(), Timeframe::Daily);
        assert_eq!("240m".parse::<Timeframe>().unwrap(), Timeframe::Hour4);
        assert!("7m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn bar_ms_matches_name() {
        assert_eq!(Timeframe::Hour1.bar_ms(), 3_600_000);
        assert_eq!(Timeframe::Daily.name(), "1d");
    }
}
