//! Effective periods, the business timezone and time sources
//!
//! Commission rules are effective-dated, monthly batches run over calendar
//! months in the business timezone, and every engine/ledger function takes a
//! [`Clock`] explicitly so tests can pin the current time.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

/// Timezone wrapper for the business calendar
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timezone::from_name(&s).map_err(serde::de::Error::custom)
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::Asia::Kuala_Lumpur)
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Parses an IANA timezone name such as `Asia/Kuala_Lumpur`
    pub fn from_name(name: &str) -> Result<Self, TemporalError> {
        Tz::from_str(name)
            .map(Timezone)
            .map_err(|_| TemporalError::InvalidTimezone(name.to_string()))
    }

    /// Gets the start of day (00:00:00) in this timezone as UTC
    ///
    /// On a DST gap the earliest valid instant is used; if the local midnight
    /// does not exist at all the naive time is read as UTC.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive = date.and_time(NaiveTime::MIN);
        self.0
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
    }

    /// Returns the calendar month `[first day, first day of next month)` as UTC
    pub fn month_period(&self, year: i32, month: u32) -> Result<ValidPeriod, TemporalError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or(TemporalError::InvalidMonth { year, month })?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or(TemporalError::InvalidMonth { year, month })?;

        ValidPeriod::bounded(self.start_of_day(first), self.start_of_day(next))
    }

    /// Returns the (year, month) the given instant falls into locally
    pub fn year_month(&self, instant: DateTime<Utc>) -> (i32, u32) {
        let local = instant.with_timezone(&self.0);
        (local.year(), local.month())
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must be before end {end}")]
    InvalidPeriod {
        start: String,
        end: String,
    },

    #[error("Invalid month: {year}-{month}")]
    InvalidMonth {
        year: i32,
        month: u32,
    },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// A half-open effective period `[start, end)`; `end == None` is open-ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidPeriod {
    /// Start of the period (inclusive)
    pub start: DateTime<Utc>,
    /// End of the period (exclusive), None means unbounded
    pub end: Option<DateTime<Utc>>,
}

impl ValidPeriod {
    /// Creates a new period
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Result<Self, TemporalError> {
        if let Some(end) = end {
            if start >= end {
                return Err(TemporalError::InvalidPeriod {
                    start: start.to_string(),
                    end: end.to_string(),
                });
            }
        }
        Ok(Self { start, end })
    }

    /// Creates an unbounded period starting from the given time
    pub fn from(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    /// Creates a bounded period
    pub fn bounded(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TemporalError> {
        Self::new(start, Some(end))
    }

    /// Returns true if this period contains the given timestamp
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && self.end.map_or(true, |e| timestamp < e)
    }

    /// Returns true if this period overlaps with another
    pub fn overlaps(&self, other: &ValidPeriod) -> bool {
        let self_end = self.end.unwrap_or(DateTime::<Utc>::MAX_UTC);
        let other_end = other.end.unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.start < other_end && other.start < self_end
    }

    /// Returns true if this period is unbounded (no end date)
    pub fn is_unbounded(&self) -> bool {
        self.end.is_none()
    }

    /// Closes the period at the given timestamp
    pub fn close_at(&mut self, timestamp: DateTime<Utc>) -> Result<(), TemporalError> {
        if timestamp <= self.start {
            return Err(TemporalError::InvalidPeriod {
                start: self.start.to_string(),
                end: timestamp.to_string(),
            });
        }
        self.end = Some(timestamp);
        Ok(())
    }
}

/// Source of the current time
///
/// Passed explicitly into the calculation engine, the wallet ledger and the
/// orchestrator instead of calling `Utc::now()` inline.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually controlled clock for deterministic tests
#[derive(Debug)]
pub struct FixedClock {
    micros: AtomicI64,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            micros: AtomicI64::new(now.timestamp_micros()),
        }
    }

    /// Moves the clock to a new instant
    pub fn set(&self, now: DateTime<Utc>) {
        self.micros.store(now.timestamp_micros(), Ordering::SeqCst);
    }

    /// Advances the clock by the given duration
    pub fn advance(&self, by: chrono::Duration) {
        let delta = by.num_microseconds().unwrap_or(i64::MAX);
        self.micros.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.micros.load(Ordering::SeqCst)).unwrap_or_default()
    }
}
