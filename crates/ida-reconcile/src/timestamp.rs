//! Timestamp normalization and the audit cut-off.
//!
//! All stores report instants in different shapes (ISO strings with or
//! without offsets, POSIX seconds, database datetimes). They are normalized
//! to whole-second UTC and rendered as `YYYY-MM-DDThh:mm:ssZ`. Fractional
//! seconds are truncated, never rounded.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A value that could not be interpreted as an instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    Unparseable { raw: String },
    OutOfRange { raw: String },
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparseable { raw } => write!(f, "unparseable timestamp '{raw}'"),
            Self::OutOfRange { raw } => write!(f, "timestamp '{raw}' is out of range"),
        }
    }
}

impl std::error::Error for TimestampError {}

/// Whole-second UTC instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(i64);

impl Timestamp {
    /// From POSIX seconds.
    pub fn from_epoch_seconds(secs: i64) -> Result<Self, TimestampError> {
        Utc.timestamp_opt(secs, 0)
            .single()
            .map(|_| Self(secs))
            .ok_or_else(|| TimestampError::OutOfRange {
                raw: secs.to_string(),
            })
    }

    /// From fractional POSIX seconds; the fraction is truncated toward
    /// negative infinity so that `x.9` stays in second `x`.
    pub fn from_epoch_f64(secs: f64) -> Result<Self, TimestampError> {
        if !secs.is_finite() {
            return Err(TimestampError::Unparseable {
                raw: secs.to_string(),
            });
        }
        let floored = secs.floor();
        if floored < i64::MIN as f64 || floored > i64::MAX as f64 {
            return Err(TimestampError::OutOfRange {
                raw: secs.to_string(),
            });
        }
        Self::from_epoch_seconds(floored as i64)
    }

    /// From any timezone-aware datetime; coerced to UTC.
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self(dt.timestamp())
    }

    /// Parse ISO-8601 / RFC 3339 text or a POSIX-seconds string.
    ///
    /// Accepted shapes:
    /// - `2023-06-01T00:00:00Z`, `2023-06-01T03:00:00.123+03:00`
    /// - `2023-06-01T00:00:00`, `2023-06-01 00:00:00` (taken as UTC)
    /// - `2023-06-01` (midnight UTC)
    /// - `1685577600`, `1685577600.75`
    pub fn parse(raw: &str) -> Result<Self, TimestampError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(TimestampError::Unparseable { raw: raw.to_string() });
        }

        if looks_numeric(s) {
            if let Ok(secs) = s.parse::<i64>() {
                return Self::from_epoch_seconds(secs);
            }
            if let Ok(secs) = s.parse::<f64>() {
                return Self::from_epoch_f64(secs);
            }
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::from_datetime(&dt));
        }
        // Offsets without a colon (`+0300`) are legal ISO-8601 but not RFC 3339.
        // `%#z` also takes the bare-hour offsets PostgreSQL prints (`+00`).
        for fmt in [
            "%Y-%m-%dT%H:%M:%S%.f%z",
            "%Y-%m-%d %H:%M:%S%.f%z",
            "%Y-%m-%d %H:%M:%S%.f%#z",
        ] {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Ok(Self::from_datetime(&dt));
            }
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Self(naive.and_utc().timestamp()));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(Self(naive.and_utc().timestamp()));
            }
        }

        Err(TimestampError::Unparseable { raw: raw.to_string() })
    }

    pub fn epoch_seconds(&self) -> i64 {
        self.0
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        // The constructors only admit representable seconds.
        Utc.timestamp_opt(self.0, 0).single().unwrap_or_default()
    }
}

fn looks_numeric(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format(CANONICAL_FORMAT))
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimestampError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Timestamp> for String {
    fn from(t: Timestamp) -> Self {
        t.to_string()
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Timestamp {
    fn from(dt: DateTime<Tz>) -> Self {
        Self::from_datetime(&dt)
    }
}

/// The audit cut-off instant `T`.
///
/// Collectors admit a record only if its recorded instant is strictly before
/// `T`; a record stamped exactly `T` is treated as too new.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cutoff(Timestamp);

impl Cutoff {
    pub fn new(at: Timestamp) -> Self {
        Self(at)
    }

    pub fn parse(raw: &str) -> Result<Self, TimestampError> {
        Timestamp::parse(raw).map(Self)
    }

    pub fn at(&self) -> Timestamp {
        self.0
    }

    pub fn admits(&self, ts: Timestamp) -> bool {
        ts.epoch_seconds() < self.0.epoch_seconds()
    }
}

impl fmt::Display for Cutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
