use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::BotError;

/// One OHLCV sample for a fixed interval
///
/// The newest bar of a window may still be forming until its period elapses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Directional trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Signal {
    Long,
    Short,
    Flat,
}

impl Signal {
    /// Position side this signal asks to open, if any
    pub fn side(self) -> Option<PositionSide> {
        match self {
            Signal::Long => Some(PositionSide::Long),
            Signal::Short => Some(PositionSide::Short),
            Signal::Flat => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Long => write!(f, "LONG"),
            Signal::Short => write!(f, "SHORT"),
            Signal::Flat => write!(f, "FLAT"),
        }
    }
}

/// Output of one strategy evaluation
///
/// Superseded by the next cycle's reading, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalReading {
    pub signal: Signal,
    pub timestamp: DateTime<Utc>,
    pub metrics: HashMap<String, f64>,
}

impl SignalReading {
    pub fn flat(timestamp: DateTime<Utc>) -> Self {
        Self {
            signal: Signal::Flat,
            timestamp,
            metrics: HashMap::new(),
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn opposite(self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    /// +1 for long, -1 for short
    pub fn direction(self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// A (venue, pair) combination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarketKey {
    pub venue: String,
    pub pair: String,
}

impl MarketKey {
    pub fn new(venue: impl Into<String>, pair: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            pair: pair.into(),
        }
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.venue, self.pair)
    }
}

/// Account position mode on a perpetual venue
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionMode {
    Hedge,
    OneWay,
}

impl FromStr for PositionMode {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "HEDGE" => Ok(PositionMode::Hedge),
            "ONEWAY" => Ok(PositionMode::OneWay),
            other => Err(BotError::InvalidConfiguration(format!(
                "Invalid position mode: {}. Valid options are: HEDGE, ONEWAY",
                other
            ))),
        }
    }
}

impl fmt::Display for PositionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionMode::Hedge => write!(f, "HEDGE"),
            PositionMode::OneWay => write!(f, "ONEWAY"),
        }
    }
}

/// Bar cadence, written as `<count><unit>` with unit one of s, m, h, d, w
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    secs: u64,
}

impl Interval {
    pub fn from_secs(secs: u64) -> Self {
        Self { secs }
    }

    pub fn as_secs(&self) -> u64 {
        self.secs
    }

    pub fn as_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.secs as i64)
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self { secs: 60 }
    }
}

impl FromStr for Interval {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || BotError::InvalidConfiguration(format!("Invalid interval: {:?}", s));

        let unit = s.chars().last().ok_or_else(invalid)?;
        let count: u64 = s[..s.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;
        let multiplier = match unit {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            'w' => 604_800,
            _ => return Err(invalid()),
        };

        if count == 0 {
            return Err(invalid());
        }

        Ok(Self {
            secs: count * multiplier,
        })
    }
}

impl TryFrom<String> for Interval {
    type Error = BotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(interval: Interval) -> Self {
        interval.to_string()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.secs;
        for (unit, size) in [('w', 604_800), ('d', 86_400), ('h', 3_600), ('m', 60)] {
            if secs % size == 0 {
                return write!(f, "{}{}", secs / size, unit);
            }
        }
        write!(f, "{}s", secs)
    }
}
