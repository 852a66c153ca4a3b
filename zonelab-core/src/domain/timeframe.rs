//! Timeframes processed by the zone engine.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bar timeframe.
///
/// The derived ordering is the processing order: slowest first. Iterating a
/// `BTreeMap<Timeframe, _>` therefore walks daily → 4h → 1h → 15m, which is
/// the order higher-timeframe confluence requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "15m")]
    M15,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown timeframe '{0}' (expected one of 1d, 4h, 1h, 15m)")]
pub struct ParseTimeframeError(pub String);

impl Timeframe {
    /// All timeframes in processing order.
    pub const ALL: [Timeframe; 4] = [Timeframe::D1, Timeframe::H4, Timeframe::H1, Timeframe::M15];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::D1 => "1d",
            Timeframe::H4 => "4h",
            Timeframe::H1 => "1h",
            Timeframe::M15 => "15m",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::D1 => Duration::days(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::M15 => Duration::minutes(15),
        }
    }

    /// Fast timeframes share the "fast" constants (15m and below).
    pub fn is_fast(&self) -> bool {
        matches!(self, Timeframe::M15)
    }

    /// True if `self` is a slower timeframe than `other`.
    pub fn is_higher_than(&self, other: Timeframe) -> bool {
        *self < other
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" | "d1" | "daily" => Ok(Timeframe::D1),
            "4h" | "h4" => Ok(Timeframe::H4),
            "1h" | "h1" => Ok(Timeframe::H1),
            "15m" | "m15" => Ok(Timeframe::M15),
            other => Err(ParseTimeframeError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_top_down() {
        let mut tfs = vec![Timeframe::M15, Timeframe::D1, Timeframe::H1, Timeframe::H4];
        tfs.sort();
        assert_eq!(tfs, Timeframe::ALL.to_vec());
        assert!(Timeframe::D1.is_higher_than(Timeframe::H4));
        assert!(!Timeframe::M15.is_higher_than(Timeframe::H1));
    }

    #[test]
    fn parse_and_display_agree() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
        assert!("3w".parse::<Timeframe>().is_err());
    }

    #[test]
    fn serde_uses_short_names() {
        assert_eq!(serde_json::to_string(&Timeframe::H4).unwrap(), "\"4h\"");
    }
}
