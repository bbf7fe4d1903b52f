//! Supervisor-side view of the worker child.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of the single worker handle owned by the supervisor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChildPhase {
    /// No worker process is held.
    #[default]
    Absent,
    /// Spawn in progress.
    Starting,
    /// Worker spawned and believed alive.
    Running,
    /// Graceful or forced stop in progress.
    Stopping,
}

/// Point-in-time status published by the supervisor loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorSnapshot {
    /// Result of the most recent session evaluation.
    pub in_session: bool,
    /// Current child handle phase.
    pub phase: ChildPhase,
    /// OS process id of the live worker.
    pub pid: Option<u32>,
    /// Identifier handed to the live worker at spawn.
    pub worker_id: Option<String>,
    /// Consecutive crashes or spawn failures.
    pub consecutive_failures: u32,
    /// The live worker has been silent for longer than the stale threshold.
    #[serde(default)]
    pub heartbeat_stale: bool,
    /// When the snapshot was taken.
    pub updated_at: Option<DateTime<Utc>>,
}
