//! Time handling shared by the aggregator, the tray label and the monitor loop.
//!
//! Log timestamps are absolute UTC instants. Everything the user sees (bucket
//! boundaries, day headers, the tray's reset hour) is expressed in a display
//! timezone, which is either the system local zone or a named IANA zone.
//! "Now" always comes from a [`Clock`] so callers can pin it in tests.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

/// Parse a log timestamp into a UTC instant.
///
/// Accepts RFC 3339 with a `Z` suffix or an explicit offset. Naive timestamps
/// (`2024-01-01T12:00:00.000`) are assumed to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    anyhow::bail!("Failed to parse timestamp: {}", raw)
}

/// Timezone used for bucketing and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayTz {
    #[default]
    Local,
    Named(Tz),
}

impl DisplayTz {
    /// `None` or an empty string selects the system local zone.
    pub fn from_config(name: Option<&str>) -> Result<Self> {
        match name.map(str::trim) {
            None | Some("") => Ok(DisplayTz::Local),
            Some(name) => name.parse(),
        }
    }

    /// Wall-clock time of `ts` in this zone.
    pub fn to_local(&self, ts: DateTime<Utc>) -> NaiveDateTime {
        match self {
            DisplayTz::Local => Local.from_utc_datetime(&ts.naive_utc()).naive_local(),
            DisplayTz::Named(tz) => tz.from_utc_datetime(&ts.naive_utc()).naive_local(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            DisplayTz::Local => "Local Time".to_string(),
            DisplayTz::Named(tz) => tz.name().to_string(),
        }
    }
}

impl FromStr for DisplayTz {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("local") {
            return Ok(DisplayTz::Local);
        }
        s.parse::<Tz>().map(DisplayTz::Named).map_err(|e| {
            anyhow!(
                "Invalid timezone '{}': {}. Example: 'UTC' or 'America/Los_Angeles'",
                s,
                e
            )
        })
    }
}

impl fmt::Display for DisplayTz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
