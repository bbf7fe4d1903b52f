//! Session-aware worker supervisor loop.
//!
//! Each poll re-derives "should a worker be running" from the wall clock
//! and reconciles the single child handle against it:
//!
//! ```text
//! Absent ──spawn──▶ Starting ──▶ Running ──session end──▶ Stopping ──▶ Absent
//!                                   │
//!                                   └──unexpected exit──────────────▶ Absent
//! ```
//!
//! The loop never exits because of a transient failure. Spawn errors and
//! crashes are logged and retried on later ticks, throttled by
//! [`RespawnBackoff`]. Stopping a worker blocks the loop until the exit
//! status has been collected.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::clock::Clock;
use crate::config::GlobalConfig;
use crate::ipc::status::StatusBoard;
use crate::models::session_window::{in_session, SessionWindow};
use crate::models::supervisor::{ChildPhase, SupervisorSnapshot};
use crate::orchestrator::backoff::RespawnBackoff;
use crate::orchestrator::spawner::{WaitOutcome, WorkerExit, WorkerLauncher, WorkerProcess};

/// Timing knobs for the supervisor loop.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Delay between ticks.
    pub poll_interval: Duration,
    /// Wait after the graceful stop request before forcing a kill.
    pub grace_period: Duration,
    /// Wait after the forced kill for the exit status.
    pub kill_wait: Duration,
    /// Heartbeat silence after which the worker is reported unhealthy.
    pub heartbeat_stale: Duration,
}

impl SupervisorSettings {
    /// Derive settings from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            grace_period: Duration::from_secs(config.shutdown.grace_seconds),
            kill_wait: Duration::from_secs(config.shutdown.kill_wait_seconds),
            heartbeat_stale: Duration::from_secs(config.worker.heartbeat_stale_seconds),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            grace_period: Duration::from_secs(10),
            kill_wait: Duration::from_secs(5),
            heartbeat_stale: Duration::from_secs(30),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to reconcile.
    Idle,
    /// A worker was started.
    Spawned {
        /// OS process id of the new worker.
        pid: Option<u32>,
    },
    /// The launcher failed; retried on a later tick.
    SpawnFailed,
    /// A spawn was due but the backoff window is still open.
    SpawnDeferred {
        /// Time left before the next attempt.
        remaining: Duration,
    },
    /// The worker was stopped and its handle cleared.
    Stopped {
        /// Whether the forced kill was needed.
        forced: bool,
    },
    /// Stopping failed; the handle is kept and the stop retried next tick.
    StopFailed,
    /// The worker died on its own during a session.
    CrashDetected {
        /// Exit status collected from the dead worker.
        exit: WorkerExit,
    },
}

struct LiveWorker<P> {
    process: P,
    started_at: Instant,
}

/// Owner of at most one worker process.
pub struct Supervisor<L: WorkerLauncher, C: Clock> {
    launcher: L,
    clock: C,
    windows: Vec<SessionWindow>,
    settings: SupervisorSettings,
    backoff: RespawnBackoff,
    child: Option<LiveWorker<L::Process>>,
    phase: ChildPhase,
    last_in_session: Option<bool>,
    status: Option<Arc<StatusBoard>>,
    heartbeat_stale: bool,
}

impl<L: WorkerLauncher, C: Clock> Supervisor<L, C> {
    /// Create a supervisor with no worker.
    #[must_use]
    pub fn new(
        launcher: L,
        clock: C,
        windows: Vec<SessionWindow>,
        settings: SupervisorSettings,
        backoff: RespawnBackoff,
    ) -> Self {
        Self {
            launcher,
            clock,
            windows,
            settings,
            backoff,
            child: None,
            phase: ChildPhase::Absent,
            last_in_session: None,
            status: None,
            heartbeat_stale: false,
        }
    }

    /// Publish snapshots to, and read heartbeats from, a status board.
    #[must_use]
    pub fn with_status_board(mut self, board: Arc<StatusBoard>) -> Self {
        self.status = Some(board);
        self
    }

    /// Current phase of the child handle.
    #[must_use]
    pub fn phase(&self) -> ChildPhase {
        self.phase
    }

    /// Whether a worker handle is held.
    #[must_use]
    pub fn has_child(&self) -> bool {
        self.child.is_some()
    }

    /// Process id of the held worker.
    #[must_use]
    pub fn child_pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|live| live.process.id())
    }

    /// Whether the live worker's heartbeat went stale on the last tick.
    #[must_use]
    pub fn heartbeat_stale(&self) -> bool {
        self.heartbeat_stale
    }

    /// Consecutive crashes or spawn failures.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.backoff.consecutive_failures()
    }

    /// Run one reconciliation step.
    pub async fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();
        let trading = in_session(now, &self.windows);
        self.log_edge(trading, now);

        let outcome = if self.child.is_some() {
            self.reconcile_held(trading).await
        } else if trading {
            self.try_spawn()
        } else {
            TickOutcome::Idle
        };

        self.check_worker_health();
        self.publish(trading);
        outcome
    }

    /// Poll until `cancel` fires, then stop any live worker.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            windows = %self.describe_windows(),
            poll_interval = ?self.settings.poll_interval,
            "supervisor started"
        );

        loop {
            let outcome = self.tick().await;
            debug!(?outcome, "supervisor tick");

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        self.shutdown().await;
        info!("supervisor stopped");
    }

    /// Stop the held worker, if any, with the graceful-then-forced sequence.
    pub async fn shutdown(&mut self) -> TickOutcome {
        if self.child.is_none() {
            return TickOutcome::Idle;
        }
        info!("stopping worker for supervisor shutdown");
        let outcome = self.stop_child().await;
        let trading = self.last_in_session.unwrap_or(false);
        self.publish(trading);
        outcome
    }

    fn try_spawn(&mut self) -> TickOutcome {
        if let Some(remaining) = self.backoff.remaining(Instant::now()) {
            debug!(?remaining, "worker respawn deferred by backoff");
            return TickOutcome::SpawnDeferred { remaining };
        }

        self.phase = ChildPhase::Starting;
        match self.launcher.spawn() {
            Ok(process) => {
                let pid = process.id();
                info!(
                    pid = pid.unwrap_or(0),
                    worker_id = process.worker_id(),
                    "worker started"
                );
                self.child = Some(LiveWorker {
                    process,
                    started_at: Instant::now(),
                });
                self.phase = ChildPhase::Running;
                self.heartbeat_stale = false;
                TickOutcome::Spawned { pid }
            }
            Err(err) => {
                self.phase = ChildPhase::Absent;
                let delay = self.backoff.record_failure(Instant::now(), None);
                error!(
                    %err,
                    failures = self.backoff.consecutive_failures(),
                    retry_in = ?delay,
                    "failed to spawn worker"
                );
                TickOutcome::SpawnFailed
            }
        }
    }

    async fn reconcile_held(&mut self, trading: bool) -> TickOutcome {
        let Some(live) = self.child.as_mut() else {
            return TickOutcome::Idle;
        };

        match live.process.try_wait() {
            Ok(Some(exit)) => {
                let uptime = live.started_at.elapsed();
                let pid = live.process.id().unwrap_or(0);
                self.child = None;
                self.phase = ChildPhase::Absent;

                if trading {
                    let delay = self.backoff.record_failure(Instant::now(), Some(uptime));
                    error!(
                        pid,
                        status = %exit,
                        ?uptime,
                        failures = self.backoff.consecutive_failures(),
                        retry_in = ?delay,
                        "worker exited unexpectedly during session"
                    );
                    TickOutcome::CrashDetected { exit }
                } else {
                    info!(pid, status = %exit, "worker exited before stop was requested");
                    self.backoff.reset();
                    TickOutcome::Stopped { forced: false }
                }
            }
            Ok(None) if trading => TickOutcome::Idle,
            Ok(None) => self.stop_child().await,
            Err(err) => {
                warn!(%err, "failed to poll worker status");
                if trading {
                    TickOutcome::Idle
                } else {
                    self.stop_child().await
                }
            }
        }
    }

    async fn stop_child(&mut self) -> TickOutcome {
        let grace = self.settings.grace_period;
        let kill_wait = self.settings.kill_wait;
        let Some(live) = self.child.as_mut() else {
            return TickOutcome::Idle;
        };
        self.phase = ChildPhase::Stopping;

        let pid = live.process.id().unwrap_or(0);
        let worker_id = live.process.worker_id().to_owned();
        let span = info_span!("stop_worker", pid, worker_id = %worker_id);

        let result = async {
            info!(?grace, "requesting graceful stop");
            let graceful = match live.process.request_graceful_stop() {
                Ok(()) => match live.process.wait(grace).await {
                    Ok(WaitOutcome::Exited(exit)) => Some(exit),
                    Ok(WaitOutcome::TimedOut) => {
                        warn!("worker did not exit within grace period, forcing kill");
                        None
                    }
                    Err(err) => {
                        warn!(%err, "error waiting for graceful exit, forcing kill");
                        None
                    }
                },
                Err(err) => {
                    warn!(%err, "graceful stop request failed, forcing kill");
                    None
                }
            };

            if let Some(exit) = graceful {
                info!(status = %exit, "worker exited gracefully");
                return Ok(false);
            }

            if let Err(err) = live.process.force_kill() {
                // Already-exited processes also land here; the wait below decides.
                warn!(%err, "force kill failed");
            }
            match live.process.wait(kill_wait).await {
                Ok(WaitOutcome::Exited(exit)) => {
                    info!(status = %exit, "worker killed");
                    Ok(true)
                }
                Ok(WaitOutcome::TimedOut) => {
                    error!(?kill_wait, "worker still alive after forced kill");
                    Err(())
                }
                Err(err) => {
                    error!(%err, "failed to confirm worker exit after kill");
                    Err(())
                }
            }
        }
        .instrument(span)
        .await;

        match result {
            Ok(forced) => {
                self.child = None;
                self.phase = ChildPhase::Absent;
                self.backoff.reset();
                TickOutcome::Stopped { forced }
            }
            Err(()) => {
                self.phase = ChildPhase::Running;
                TickOutcome::StopFailed
            }
        }
    }

    fn log_edge(&mut self, trading: bool, now: NaiveTime) {
        if self.last_in_session == Some(trading) {
            return;
        }
        let time = now.format("%H:%M:%S").to_string();
        if trading {
            info!(time, "trading session open");
        } else {
            info!(time, "outside trading session");
        }
        self.last_in_session = Some(trading);
    }

    fn check_worker_health(&mut self) {
        let Some(live) = self.child.as_ref() else {
            self.heartbeat_stale = false;
            return;
        };
        let Some(board) = self.status.as_ref() else {
            return;
        };

        // Heartbeats from an earlier worker never count for the current one.
        let silent_for = match board.latest_heartbeat() {
            Some(hb) if hb.worker_id == live.process.worker_id() => {
                Duration::from_secs(hb.age_seconds(Utc::now()))
            }
            _ => live.started_at.elapsed(),
        };

        let stale = silent_for >= self.settings.heartbeat_stale;
        if stale && !self.heartbeat_stale {
            warn!(
                pid = live.process.id().unwrap_or(0),
                silent_for = ?silent_for,
                "worker heartbeat is stale"
            );
        } else if !stale && self.heartbeat_stale {
            info!("worker heartbeat recovered");
        }
        self.heartbeat_stale = stale;
    }

    fn publish(&self, trading: bool) {
        let Some(board) = self.status.as_ref() else {
            return;
        };
        board.publish(SupervisorSnapshot {
            in_session: trading,
            phase: self.phase,
            pid: self.child_pid(),
            worker_id: self
                .child
                .as_ref()
                .map(|live| live.process.worker_id().to_owned()),
            consecutive_failures: self.backoff.consecutive_failures(),
            heartbeat_stale: self.heartbeat_stale,
            updated_at: Some(Utc::now()),
        });
    }

    fn describe_windows(&self) -> String {
        if self.windows.is_empty() {
            return "none".into();
        }
        self.windows
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
