use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FeedError;

const DAY_MS: i64 = 86_400_000;

/// Half-open replay window `[start_ms, end_ms)` in UTC milliseconds.
///
/// Serialized as the compact `"START-END"` text form, where each side is
/// `YYYYMMDD`, `YYYYMMDDHHMM`, or a raw epoch in seconds (10 digits) or
/// milliseconds (13 digits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeRange {
    /// Inclusive start timestamp in milliseconds.
    pub start_ms: i64,
    /// Exclusive end timestamp in milliseconds.
    pub end_ms: i64,
}

impl TimeRange {
    /// Build a range, rejecting empty or inverted windows.
    ///
    /// # Errors
    /// Returns `InvalidArg` when `end_ms <= start_ms`.
    pub fn new(start_ms: i64, end_ms: i64) -> Result<Self, FeedError> {
        if end_ms <= start_ms {
            return Err(FeedError::InvalidArg(format!(
                "time range end {end_ms} must be after start {start_ms}"
            )));
        }
        Ok(Self { start_ms, end_ms })
    }

    /// Length of the window in whole seconds.
    #[must_use]
    pub const fn len_secs(&self) -> i64 {
        (self.end_ms - self.start_ms) / 1000
    }

    /// Returns true if `ts_ms` falls inside the window.
    #[must_use]
    pub const fn contains(&self, ts_ms: i64) -> bool {
        ts_ms >= self.start_ms && ts_ms < self.end_ms
    }
}

fn parse_point(text: &str) -> Result<i64, FeedError> {
    let bad = || FeedError::InvalidArg(format!("unrecognized time point: {text}"));
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    match text.len() {
        8 => {
            let date = NaiveDate::parse_from_str(text, "%Y%m%d").map_err(|_| bad())?;
            let naive = date.and_hms_opt(0, 0, 0).ok_or_else(bad)?;
            Ok(naive.and_utc().timestamp_millis())
        }
        12 => {
            let naive = NaiveDateTime::parse_from_str(text, "%Y%m%d%H%M").map_err(|_| bad())?;
            Ok(naive.and_utc().timestamp_millis())
        }
        10 => text.parse::<i64>().map(|s| s * 1000).map_err(|_| bad()),
        13 => text.parse::<i64>().map_err(|_| bad()),
        _ => Err(bad()),
    }
}

fn format_point(ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) if ms % DAY_MS == 0 => dt.format("%Y%m%d").to_string(),
        Some(dt) if ms % 60_000 == 0 => dt.format("%Y%m%d%H%M").to_string(),
        _ => ms.to_string(),
    }
}

impl FromStr for TimeRange {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| FeedError::InvalidArg(format!("time range needs START-END: {s}")))?;
        Self::new(parse_point(start.trim())?, parse_point(end.trim())?)
    }
}

impl TryFrom<String> for TimeRange {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeRange> for String {
    fn from(r: TimeRange) -> Self {
        r.to_string()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            format_point(self.start_ms),
            format_point(self.end_ms)
        )
    }
}
