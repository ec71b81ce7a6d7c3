//! # Time handling: timestamps, bucket widths and periods
//!
//! - [`parse_timestamp`] / [`format_timestamp`] convert between the fixed raw format
//!   (`%d/%m/%Y %H:%M:%S`, UTC wall clock) and Unix milliseconds.
//! - [`Resolution`] is a bucket width written the way artifact names spell it
//!   (`30s`, `15m`, `1h`, `1d`).
//! - [`Period`] is the calendar partition of the input tree (a year or a month) and
//!   bounds the timestamps of a converted partition.
//!
//! Bucket starts are computed with [`Resolution::window_start`], i.e.
//! `floor(t / width) * width` on the Unix millisecond axis.
use std::{fmt, str::FromStr, sync::LazyLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::{
    ais_errors::AisError,
    constants::{
        UnixMillis, MILLIS_PER_DAY, MILLIS_PER_HOUR, MILLIS_PER_MINUTE, MILLIS_PER_SECOND,
        TIMESTAMP_FORMAT,
    },
};

static RESOLUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(s|m|h|d)$").expect("valid resolution regex"));

static PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(?:-(\d{2}))?$").expect("valid period regex"));

/// Parse a raw timestamp cell into Unix milliseconds.
///
/// Arguments
/// -----------------
/// * `value`: a cell formatted as `%d/%m/%Y %H:%M:%S` (e.g. `15/12/2021 03:00:00`).
///
/// Return
/// ----------
/// * `Some(millis)` on success, `None` when the cell does not match the format.
pub fn parse_timestamp(value: &str) -> Option<UnixMillis> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Render Unix milliseconds back into the raw timestamp format.
pub fn format_timestamp(millis: UnixMillis) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        None => format!("<invalid:{millis}>"),
    }
}

/// A fixed bucket width.
///
/// Parsed from and displayed as `<count><unit>` with unit in `s`, `m`, `h`, `d`.
/// Display picks the largest unit dividing the width, so `60m` prints as `1h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Resolution {
    millis: i64,
}

impl Resolution {
    /// Build a resolution from a width in milliseconds.
    ///
    /// Return
    /// ----------
    /// * [`AisError::InvalidResolution`] for a non-positive width.
    pub fn from_millis(millis: i64) -> Result<Self, AisError> {
        if millis <= 0 {
            return Err(AisError::InvalidResolution(format!(
                "width must be positive, got {millis}ms"
            )));
        }
        Ok(Resolution { millis })
    }

    pub fn minutes(n: i64) -> Result<Self, AisError> {
        Self::from_millis(n * MILLIS_PER_MINUTE)
    }

    pub fn hours(n: i64) -> Result<Self, AisError> {
        Self::from_millis(n * MILLIS_PER_HOUR)
    }

    pub fn as_millis(&self) -> i64 {
        self.millis
    }

    /// Start of the left-closed window `[start, start + width)` containing `t`.
    ///
    /// Uses Euclidean division so instants before 1970 still floor downwards.
    #[inline]
    pub fn window_start(&self, t: UnixMillis) -> UnixMillis {
        t.div_euclid(self.millis) * self.millis
    }

    /// `true` when `other` is a whole multiple of `self`.
    pub fn divides(&self, other: &Resolution) -> bool {
        other.millis % self.millis == 0
    }
}

impl FromStr for Resolution {
    type Err = AisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = RESOLUTION_RE
            .captures(s.trim())
            .ok_or_else(|| AisError::InvalidResolution(s.to_string()))?;
        let count: i64 = caps[1]
            .parse()
            .map_err(|_| AisError::InvalidResolution(s.to_string()))?;
        let unit = match &caps[2] {
            "s" => MILLIS_PER_SECOND,
            "m" => MILLIS_PER_MINUTE,
            "h" => MILLIS_PER_HOUR,
            _ => MILLIS_PER_DAY,
        };
        count
            .checked_mul(unit)
            .ok_or_else(|| AisError::InvalidResolution(s.to_string()))
            .and_then(Resolution::from_millis)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = [
            (MILLIS_PER_DAY, "d"),
            (MILLIS_PER_HOUR, "h"),
            (MILLIS_PER_MINUTE, "m"),
            (MILLIS_PER_SECOND, "s"),
        ];
        for (size, suffix) in units {
            if self.millis % size == 0 {
                return write!(f, "{}{suffix}", self.millis / size);
            }
        }
        write!(f, "{}ms", self.millis)
    }
}

/// Calendar partition of the input tree: a whole year (`2024`) or a month (`2024-05`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Year(i32),
    Month(i32, u32),
}

impl Period {
    /// Half-open bounds `[start, end)` of the period in Unix milliseconds.
    pub fn bounds(&self) -> (UnixMillis, UnixMillis) {
        let (start, end) = match *self {
            Period::Year(y) => (first_day(y, 1), first_day(y + 1, 1)),
            Period::Month(y, 12) => (first_day(y, 12), first_day(y + 1, 1)),
            Period::Month(y, m) => (first_day(y, m), first_day(y, m + 1)),
        };
        (start, end)
    }

    pub fn contains(&self, t: UnixMillis) -> bool {
        let (start, end) = self.bounds();
        start <= t && t < end
    }

    pub fn year(&self) -> i32 {
        match *self {
            Period::Year(y) | Period::Month(y, _) => y,
        }
    }
}

fn first_day(year: i32, month: u32) -> UnixMillis {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(i64::MAX)
}

impl FromStr for Period {
    type Err = AisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = PERIOD_RE
            .captures(s.trim())
            .ok_or_else(|| AisError::InvalidPeriod(s.to_string()))?;
        let year: i32 = caps[1]
            .parse()
            .map_err(|_| AisError::InvalidPeriod(s.to_string()))?;
        match caps.get(2) {
            None => Ok(Period::Year(year)),
            Some(m) => {
                let month: u32 = m
                    .as_str()
                    .parse()
                    .map_err(|_| AisError::InvalidPeriod(s.to_string()))?;
                if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
                    return Err(AisError::InvalidPeriod(s.to_string()));
                }
                Ok(Period::Month(year, month))
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Year(y) => write!(f, "{y:04}"),
            Period::Month(y, m) => write!(f, "{y:04}-{m:02}"),
        }
    }
}

/// Hour of day (UTC) of a Unix millisecond instant.
pub fn hour_of_day(millis: UnixMillis) -> Option<u32> {
    use chrono::Timelike;
    DateTime::from_timestamp_millis(millis).map(|dt| dt.hour())
}
