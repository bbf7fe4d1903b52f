//! Recurring time-of-day trading windows and the in-session predicate.

use std::fmt::{Display, Formatter};

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{AppError, Result};

/// A daily trading window on a 24h clock.
///
/// When `start > end` the window spans midnight, e.g. a night session
/// running from 20:45 to 02:45 the following morning. Both bounds are
/// inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionWindow {
    /// Label used in logs (`day`, `night`, ...).
    #[serde(default)]
    pub name: String,
    /// First instant of the window.
    #[serde(deserialize_with = "deserialize_time_of_day")]
    pub start: NaiveTime,
    /// Last instant of the window.
    #[serde(deserialize_with = "deserialize_time_of_day")]
    pub end: NaiveTime,
}

impl SessionWindow {
    /// Construct a window from explicit bounds.
    #[must_use]
    pub fn new(name: impl Into<String>, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    /// Whether the window crosses midnight.
    #[must_use]
    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Inclusive membership test for a time of day.
    #[must_use]
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.wraps_midnight() {
            now >= self.start || now <= self.end
        } else {
            self.start <= now && now <= self.end
        }
    }
}

impl Display for SessionWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.name,
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S")
        )
    }
}

/// Whether `now` falls inside any of the configured windows.
///
/// An empty window list is never in session.
#[must_use]
pub fn in_session(now: NaiveTime, windows: &[SessionWindow]) -> bool {
    windows.iter().any(|window| window.contains(now))
}

/// Parse `HH:MM` or `HH:MM:SS` into a time of day.
///
/// # Errors
///
/// Returns `AppError::Config` if the text matches neither format.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|err| AppError::Config(format!("invalid time of day '{raw}': {err}")))
}

fn deserialize_time_of_day<'de, D>(deserializer: D) -> std::result::Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_time_of_day(&raw).map_err(serde::de::Error::custom)
}
