use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Nominal candle spacing of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "m1")]
    M1,
    #[serde(rename = "m5")]
    M5,
    #[serde(rename = "m15")]
    M15,
    #[serde(rename = "h1")]
    H1,
    #[serde(rename = "d1")]
    D1,
}

#[derive(Debug, Error)]
#[error("invalid timeframe '{0}'. expected one of: m1 | m5 | m15 | h1 | d1")]
pub struct TimeframeParseError(pub String);

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "m1",
            Timeframe::M5 => "m5",
            Timeframe::M15 => "m15",
            Timeframe::H1 => "h1",
            Timeframe::D1 => "d1",
        }
    }

    /// Nominal spacing between consecutive candles, in minutes.
    pub fn spacing_minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::D1 => 1440,
        }
    }

    pub fn parse(s: &str) -> Result<Self, TimeframeParseError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m1" | "1m" | "1min" => Ok(Timeframe::M1),
            "m5" | "5m" | "5min" => Ok(Timeframe::M5),
            "m15" | "15m" | "15min" => Ok(Timeframe::M15),
            "h1" | "1h" | "60m" => Ok(Timeframe::H1),
            "d1" | "1d" => Ok(Timeframe::D1),
            other => Err(TimeframeParseError(other.to_string())),
        }
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::parse(s)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
