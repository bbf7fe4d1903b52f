//! Latest supervisor snapshot and worker heartbeat.

use tokio::sync::watch;

use crate::models::heartbeat::WorkerHeartbeat;
use crate::models::supervisor::SupervisorSnapshot;

/// Shared board written by the supervisor loop and the IPC server.
#[derive(Debug)]
pub struct StatusBoard {
    supervisor: watch::Sender<SupervisorSnapshot>,
    heartbeat: watch::Sender<Option<WorkerHeartbeat>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Empty board: no worker, no heartbeat.
    #[must_use]
    pub fn new() -> Self {
        let (supervisor, _) = watch::channel(SupervisorSnapshot::default());
        let (heartbeat, _) = watch::channel(None);
        Self {
            supervisor,
            heartbeat,
        }
    }

    /// Replace the supervisor snapshot.
    ///
    /// A heartbeat belonging to a different worker than the snapshot's is
    /// discarded.
    pub fn publish(&self, snapshot: SupervisorSnapshot) {
        let current_worker = snapshot.worker_id.clone();
        self.supervisor.send_replace(snapshot);
        self.heartbeat.send_if_modified(|heartbeat| {
            let stale = heartbeat
                .as_ref()
                .is_some_and(|hb| Some(&hb.worker_id) != current_worker.as_ref());
            if stale {
                *heartbeat = None;
            }
            stale
        });
    }

    /// Current supervisor snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.supervisor.borrow().clone()
    }

    /// Store a heartbeat if it comes from the current worker.
    ///
    /// Returns `false` when the heartbeat was ignored.
    pub fn record_heartbeat(&self, heartbeat: WorkerHeartbeat) -> bool {
        let accepted = self.supervisor.borrow().worker_id.as_deref()
            == Some(heartbeat.worker_id.as_str());
        if accepted {
            self.heartbeat.send_replace(Some(heartbeat));
        }
        accepted
    }

    /// Most recent accepted heartbeat.
    #[must_use]
    pub fn latest_heartbeat(&self) -> Option<WorkerHeartbeat> {
        self.heartbeat.borrow().clone()
    }

    /// Subscribe to accepted heartbeats.
    #[must_use]
    pub fn subscribe_heartbeats(&self) -> watch::Receiver<Option<WorkerHeartbeat>> {
        self.heartbeat.subscribe()
    }
}
