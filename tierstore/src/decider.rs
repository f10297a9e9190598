//! Archival decision policy and creation timestamp normalization.

use crate::error::{TierError, TierResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Placement decided for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    KeepHot,
    Archive,
}

/// Pure age-based policy: archive once a record is strictly older than the
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivalDecider {
    threshold: Duration,
}

impl ArchivalDecider {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn decide(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Decision {
        if now - created_at > self.threshold {
            Decision::Archive
        } else {
            Decision::KeepHot
        }
    }

    /// Parse a raw creation timestamp and decide in one step.
    pub fn decide_raw(&self, created_at: &str, now: DateTime<Utc>) -> TierResult<Decision> {
        Ok(self.decide(parse_created_at(created_at)?, now))
    }
}

impl Default for ArchivalDecider {
    fn default() -> Self {
        Self::new(Duration::days(90))
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Normalize a creation timestamp to UTC.
///
/// Offset-qualified values (`Z` or `+hh:mm`) are converted; naive date-times
/// and bare dates are taken as UTC.
pub fn parse_created_at(raw: &str) -> TierResult<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(TierError::Validation("creation timestamp is empty".to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(TierError::Validation(format!(
        "unparseable creation timestamp '{}'",
        raw
    )))
}
