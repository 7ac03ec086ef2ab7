//! Timestamp utilities
//!
//! The clinical store keeps timestamps as SQLite TEXT. These helpers convert
//! between that representation and `chrono::NaiveDateTime`, and compute the
//! elapsed offsets used by the time series.

use crate::{Error, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Formats accepted when reading timestamps from the store
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Format used when binding timestamps into queries
pub const STORE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a timestamp as stored in the clinical store.
///
/// Date-only values (`YYYY-MM-DD`) are accepted and read as midnight.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts);
        }
    }
    Err(Error::Parse(format!("Unrecognized timestamp: {:?}", text)))
}

/// Render a timestamp the way the store compares them
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(STORE_TIMESTAMP_FORMAT).to_string()
}

/// Offset of a measurement from the admission anchor.
///
/// Hours and minutes come from floor division of the signed delta, so a
/// reading 30 minutes before admission is `-1:30`, never `0:-30`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElapsedTime {
    pub hours: i64,
    pub minutes: i64,
}

impl ElapsedTime {
    /// The anchor itself, used by the static entries
    pub const ZERO: ElapsedTime = ElapsedTime { hours: 0, minutes: 0 };

    /// Elapsed time of `at` relative to `anchor`
    pub fn between(anchor: NaiveDateTime, at: NaiveDateTime) -> Self {
        Self::from_delta(at - anchor)
    }

    pub fn from_delta(delta: Duration) -> Self {
        // num_seconds truncates toward zero; floor sub-second negatives
        let mut seconds = delta.num_seconds();
        if Duration::seconds(seconds) > delta {
            seconds -= 1;
        }
        ElapsedTime {
            hours: seconds.div_euclid(3600),
            minutes: seconds.rem_euclid(3600) / 60,
        }
    }

    /// True for offsets before the anchor (clock skew in the feed)
    pub fn is_negative(&self) -> bool {
        self.hours < 0
    }
}

impl fmt::Display for ElapsedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hours, self.minutes)
    }
}

impl FromStr for ElapsedTime {
    type Err = Error;

    /// Parse `HH:MM` as written to the patient files
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Parse(format!("Invalid elapsed time: {:?}", s));
        let (hours, minutes) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hours: i64 = hours.parse().map_err(|_| invalid())?;
        let minutes: i64 = minutes.parse().map_err(|_| invalid())?;
        if !(0..60).contains(&minutes) {
            return Err(invalid());
        }
        Ok(ElapsedTime { hours, minutes })
    }
}

impl Serialize for ElapsedTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
