//! Wall-clock source for session evaluation.

use chrono::{FixedOffset, Local, NaiveTime, Utc};

use crate::config::ClockConfig;
use crate::{AppError, Result};

/// Supplies the current time of day. Injected so session boundaries can be
/// exercised deterministically.
pub trait Clock: Send + Sync {
    /// Current time of day.
    fn now(&self) -> NaiveTime;
}

/// Real wall clock, in the host's local zone or at a fixed offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    offset: Option<FixedOffset>,
}

impl SystemClock {
    /// Clock reading the host's local time zone.
    #[must_use]
    pub fn local() -> Self {
        Self { offset: None }
    }

    /// Build from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the offset is outside ±24h.
    pub fn from_config(config: &ClockConfig) -> Result<Self> {
        let Some(minutes) = config.utc_offset_minutes else {
            return Ok(Self::local());
        };
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                AppError::Config(format!("clock.utc_offset_minutes out of range: {minutes}"))
            })?;
        Ok(Self {
            offset: Some(offset),
        })
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveTime {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset).time(),
            None => Local::now().time(),
        }
    }
}
