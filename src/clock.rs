//! Virtual clock advancing in fixed ticks
//!
//! The simulation never reads wall time; the harness owns a [`Clock`] and
//! advances it between `Schedule` calls.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OversimError, Result};

/// A point in virtual time.
///
/// Ordering and equality follow the underlying timestamp, so clocks can be
/// used directly as queue tie-breakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Clock(DateTime<Utc>);

impl Clock {
    /// Wrap a chrono timestamp
    pub fn new(inner: DateTime<Utc>) -> Self {
        Self(inner)
    }

    /// Parse an RFC 3339 timestamp, e.g. `2019-01-01T00:00:00+09:00`
    pub fn from_rfc3339(s: &str) -> Result<Self> {
        let parsed = DateTime::parse_from_rfc3339(s)
            .map_err(|e| OversimError::config(format!("invalid clock {s:?}: {e}")))?;
        Ok(Self(parsed.with_timezone(&Utc)))
    }

    /// A clock shifted forward by `secs` seconds (negative shifts backward)
    pub fn add(&self, secs: i64) -> Self {
        Self(self.0 + Duration::seconds(secs))
    }

    /// A clock advanced by `ticks` ticks of `tick_secs` seconds each
    pub fn tick(&self, ticks: i64, tick_secs: i64) -> Self {
        self.add(ticks * tick_secs)
    }

    /// Seconds elapsed since `earlier` (negative if `earlier` is later)
    pub fn diff_seconds(&self, earlier: &Clock) -> i64 {
        (self.0 - earlier.0).num_seconds()
    }

    /// Whether this clock is strictly before `other`
    pub fn before(&self, other: &Clock) -> bool {
        self.0 < other.0
    }

    /// The underlying timestamp
    pub fn inner(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
