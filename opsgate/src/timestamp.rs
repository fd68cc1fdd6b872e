//! Unix timestamps and deadline parsing.
//!
//! Billing-issued intents carry their deadline as an ISO-8601 date-time
//! string, while the settlement contract and the marketplace order service
//! both want whole seconds since the Unix epoch. [`UnixTimestamp`] is the
//! seconds form; [`parse_deadline`] reads the string form.

use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch (1970-01-01T00:00:00Z).
///
/// Serialized as a plain JSON integer.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimestamp(u64);

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<Duration> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(rhs.as_secs()))
    }
}

impl UnixTimestamp {
    /// Creates a new [`UnixTimestamp`] from a raw seconds value.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the current system time as a [`UnixTimestamp`].
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set to a time before the Unix epoch.
    #[must_use]
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_secs();
        Self(now)
    }

    /// Converts a date-time to whole seconds, truncating any sub-second part.
    ///
    /// Returns `None` for instants before the epoch.
    #[must_use]
    pub fn from_datetime(datetime: &DateTime<Utc>) -> Option<Self> {
        u64::try_from(datetime.timestamp()).ok().map(Self)
    }

    /// Returns the timestamp as raw seconds since the Unix epoch.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }
}

/// Parses an ISO-8601 deadline.
///
/// RFC 3339 strings with an offset are converted to UTC. A date-time without
/// an offset is taken to be UTC.
///
/// # Errors
///
/// Returns the underlying [`chrono::ParseError`] when neither form matches.
pub fn parse_deadline(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    match DateTime::parse_from_rfc3339(raw) {
        Ok(datetime) => Ok(datetime.with_timezone(&Utc)),
        Err(err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| err),
    }
}
