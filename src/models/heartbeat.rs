//! Liveness pings sent from the worker to the supervisor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::bootstrap::BootstrapState;

/// A single liveness report carrying the worker's bootstrap state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerHeartbeat {
    /// Identifier assigned by the supervisor when the worker was spawned.
    pub worker_id: String,
    /// Worker OS process id.
    pub pid: u32,
    /// Bootstrap state at the time of sending.
    pub state: BootstrapState,
    /// Send timestamp.
    pub sent_at: DateTime<Utc>,
}

impl WorkerHeartbeat {
    /// Build a heartbeat stamped with the current time.
    #[must_use]
    pub fn now(worker_id: impl Into<String>, pid: u32, state: BootstrapState) -> Self {
        Self {
            worker_id: worker_id.into(),
            pid,
            state,
            sent_at: Utc::now(),
        }
    }

    /// Seconds elapsed since the heartbeat was sent, saturating at zero.
    #[must_use]
    pub fn age_seconds(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.sent_at).num_seconds()).unwrap_or(0)
    }
}
