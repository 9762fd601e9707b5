use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FeedError;
use crate::timeseries::util::{WEEK_ORIGIN_MS, align_down_from, align_up_from};

/// Next-due sentinel of a feeder that has no more data.
pub const EXHAUSTED_MS: i64 = i64::MAX;

/// Instrument symbol as used by the exchange (e.g. `BTC/USDT:USDT`).
///
/// Ordering is lexicographic and is the tie-break of the replay merge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Validate and wrap a symbol string.
    ///
    /// # Errors
    /// Returns `InvalidArg` when the symbol is empty or contains whitespace or `|`.
    pub fn new(s: impl Into<String>) -> Result<Self, FeedError> {
        let s = s.into();
        if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '|') {
            return Err(FeedError::InvalidArg(format!("invalid symbol: {s:?}")));
        }
        Ok(Self(s))
    }

    /// Borrow the symbol text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0
    }
}

/// Fixed bar duration, stored in whole seconds.
///
/// Text form is the largest unit that divides the length evenly: `1m`, `15m`,
/// `4h`, `1d`, `1w`; anything else falls back to seconds (`90s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe(u32);

impl Timeframe {
    /// One minute.
    pub const M1: Self = Self(60);
    /// Five minutes.
    pub const M5: Self = Self(300);
    /// Fifteen minutes.
    pub const M15: Self = Self(900);
    /// One hour.
    pub const H1: Self = Self(3_600);
    /// Four hours.
    pub const H4: Self = Self(14_400);
    /// One day.
    pub const D1: Self = Self(86_400);

    /// Build a timeframe from a length in seconds.
    ///
    /// # Errors
    /// Returns `InvalidArg` for zero.
    pub fn from_secs(secs: u32) -> Result<Self, FeedError> {
        if secs == 0 {
            return Err(FeedError::InvalidArg("timeframe must be positive".into()));
        }
        Ok(Self(secs))
    }

    /// Length in seconds.
    #[must_use]
    pub const fn secs(self) -> i64 {
        self.0 as i64
    }

    /// Length in milliseconds.
    #[must_use]
    pub const fn ms(self) -> i64 {
        self.0 as i64 * 1000
    }

    const fn origin_ms(self) -> i64 {
        if self.0 % 604_800 == 0 { WEEK_ORIGIN_MS } else { 0 }
    }

    /// Start of the bar containing `ts_ms`. Weekly bars start on Monday.
    #[must_use]
    pub const fn align(self, ts_ms: i64) -> i64 {
        align_down_from(ts_ms, self.ms(), self.origin_ms())
    }

    /// Smallest bar start at or after `ts_ms`.
    #[must_use]
    pub const fn align_up(self, ts_ms: i64) -> i64 {
        align_up_from(ts_ms, self.ms(), self.origin_ms())
    }

    /// Returns true if bars of `self` can be built from bars of `smaller`.
    #[must_use]
    pub const fn is_multiple_of(self, smaller: Self) -> bool {
        self.0 >= smaller.0 && self.0 % smaller.0 == 0
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(u32, char); 4] = [(604_800, 'w'), (86_400, 'd'), (3_600, 'h'), (60, 'm')];
        for (len, unit) in UNITS {
            if self.0 % len == 0 {
                return write!(f, "{}{unit}", self.0 / len);
            }
        }
        write!(f, "{}s", self.0)
    }
}

impl FromStr for Timeframe {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || FeedError::InvalidArg(format!("invalid timeframe: {s:?}"));
        let s = s.trim();
        let unit = s.chars().last().ok_or_else(bad)?;
        let count: u32 = s[..s.len() - unit.len_utf8()].parse().map_err(|_| bad())?;
        let scale = match unit {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            'w' => 604_800,
            _ => return Err(bad()),
        };
        Self::from_secs(count.checked_mul(scale).ok_or_else(bad)?)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}

/// Canonical instrument metadata resolved from a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Storage identifier.
    pub id: i64,
    /// Exchange symbol.
    pub symbol: Symbol,
    /// Exchange identifier.
    pub exchange: String,
    /// Market identifier.
    pub market: String,
}

/// OHLCV record keyed by its interval start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Interval start in UTC milliseconds.
    #[serde(rename = "timestamp")]
    pub ts: i64,
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Traded volume.
    pub volume: f64,
}

impl Bar {
    /// Timestamp at which a bar of `timeframe` starting at `ts` closes.
    #[must_use]
    pub const fn close_ms(&self, timeframe: Timeframe) -> i64 {
        self.ts.saturating_add(timeframe.ms())
    }

    /// Interval start as a UTC datetime.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.ts)
    }
}

/// A bar delivered to the trading engine together with its instrument and timeframe.
#[derive(Debug, Clone, PartialEq)]
pub struct BarEvent {
    /// Owning instrument.
    pub symbol: Symbol,
    /// Timeframe of `bar`.
    pub timeframe: Timeframe,
    /// The bar itself.
    pub bar: Bar,
}

/// Key of a resume timestamp: one instrument at one timeframe.
///
/// Renders as `symbol|timeframe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResumeKey {
    /// Instrument.
    pub symbol: Symbol,
    /// Timeframe the resume point refers to.
    pub timeframe: Timeframe,
}

impl ResumeKey {
    /// Build a key.
    #[must_use]
    pub const fn new(symbol: Symbol, timeframe: Timeframe) -> Self {
        Self { symbol, timeframe }
    }
}

impl fmt::Display for ResumeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.symbol, self.timeframe)
    }
}
