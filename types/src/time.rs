//! Timestamp type used throughout the ledger.
//!
//! Vote records carry Unix epoch milliseconds (UTC). Aggregated output
//! renders them as ISO-8601 for human consumption.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in milliseconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimestampMs(u64);

impl TimestampMs {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the current system time as a `TimestampMs`.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_millis() as u64;
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: TimestampMs) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Whether this timestamp + window has passed relative to `now`.
    pub fn has_expired(&self, window_ms: u64, now: TimestampMs) -> bool {
        now.0 >= self.0.saturating_add(window_ms)
    }

    /// The timestamp `window_ms` after this one (saturating).
    pub fn plus(&self, window_ms: u64) -> TimestampMs {
        Self(self.0.saturating_add(window_ms))
    }

    /// Render as an ISO-8601 UTC string with millisecond precision,
    /// e.g. `2025-02-19T13:13:35.565Z`.
    pub fn to_iso8601(&self) -> String {
        match DateTime::<Utc>::from_timestamp_millis(self.0 as i64) {
            Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            // Out of chrono's range; fall back to the raw value.
            None => self.0.to_string(),
        }
    }
}

impl fmt::Display for TimestampMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
