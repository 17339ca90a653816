//! `HH:MM:SS` durations with unbounded hours.

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

static HMS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+):(\d+):(\d+)$").expect("valid regex"));

/// A non-negative span of work time at one-second resolution.
///
/// Serialized as its `HH:MM:SS` rendering so store files stay readable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkDuration {
    secs: u64,
}

impl WorkDuration {
    pub const ZERO: WorkDuration = WorkDuration { secs: 0 };

    pub fn from_secs(secs: u64) -> Self {
        WorkDuration { secs }
    }

    pub fn from_hms(hours: u64, minutes: u64, seconds: u64) -> Self {
        WorkDuration {
            secs: hours * 3600 + minutes * 60 + seconds,
        }
    }

    pub fn as_secs(&self) -> u64 {
        self.secs
    }

    /// Parses `HH:MM:SS`. Fields may be any width; minute/second overflow carries into the next field.
    pub fn parse(s: &str) -> Result<Self> {
        let bad = || Error::Format {
            input: s.to_string(),
        };
        let caps = HMS.captures(s.trim()).ok_or_else(bad)?;
        let field = |i: usize| caps[i].parse::<u64>().map_err(|_| bad());
        let (h, m, sec) = (field(1)?, field(2)?, field(3)?);
        h.checked_mul(3600)
            .and_then(|h| m.checked_mul(60).and_then(|m| h.checked_add(m)))
            .and_then(|hm| hm.checked_add(sec))
            .map(WorkDuration::from_secs)
            .ok_or_else(bad)
    }

    /// Whole seconds from `start` to `end`, sub-second precision truncated.
    /// Clamped to zero if `end` precedes `start`.
    pub fn between<Tz: TimeZone>(start: &DateTime<Tz>, end: &DateTime<Tz>) -> Self {
        let secs = end.clone().signed_duration_since(start.clone()).num_seconds();
        WorkDuration::from_secs(secs.max(0) as u64)
    }

    pub fn hours(&self) -> u64 {
        self.secs / 3600
    }

    pub fn minutes(&self) -> u64 {
        self.secs % 3600 / 60
    }

    pub fn seconds(&self) -> u64 {
        self.secs % 60
    }
}

impl fmt::Display for WorkDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours(), self.minutes(), self.seconds())
    }
}

impl FromStr for WorkDuration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WorkDuration::parse(s)
    }
}

impl TryFrom<String> for WorkDuration {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        WorkDuration::parse(&s)
    }
}

impl From<WorkDuration> for String {
    fn from(d: WorkDuration) -> Self {
        d.to_string()
    }
}

impl Add for WorkDuration {
    type Output = WorkDuration;

    fn add(self, rhs: WorkDuration) -> WorkDuration {
        WorkDuration::from_secs(self.secs.saturating_add(rhs.secs))
    }
}

impl AddAssign for WorkDuration {
    fn add_assign(&mut self, rhs: WorkDuration) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for WorkDuration {
    fn sum<I: Iterator<Item = WorkDuration>>(iter: I) -> Self {
        iter.fold(WorkDuration::ZERO, Add::add)
    }
}
