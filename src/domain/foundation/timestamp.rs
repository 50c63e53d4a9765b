//! UTC instant used for billing periods and grace-window math.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// An immutable UTC instant.
///
/// All period boundaries (`period_start`, `period_end`) and the grace-window
/// arithmetic in the subscription aggregate are expressed in this type, so
/// day offsets live here rather than on raw `chrono` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Offset by whole days; negative values move into the past.
    pub fn add_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    pub fn minus_days(&self, days: i64) -> Self {
        Self(self.0 - Duration::days(days))
    }

    /// Whole days from `self` until `other`, negative when `other` is
    /// earlier. Partial days truncate toward zero, which is what the
    /// pro-ration credit wants: a period used for 10.9 days credits 19
    /// remaining days of a 30-day period, not 20.
    pub fn days_until(&self, other: &Timestamp) -> i64 {
        other.0.signed_duration_since(self.0).num_days()
    }

    /// Builds a timestamp from Unix seconds, as carried by the provider's
    /// `ts=` signature header field.
    pub fn from_unix_secs(secs: u64) -> Self {
        Self(Utc.timestamp_opt(secs as i64, 0).unwrap())
    }

    pub fn as_unix_secs(&self) -> u64 {
        self.0.timestamp() as u64
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0 + Duration::seconds(secs as i64))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}
