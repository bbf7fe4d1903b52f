//! Supervisor reconciliation against scripted worker processes.
//!
//! Time is paused so grace periods and backoff windows elapse instantly.

use std::sync::Arc;
use std::time::Duration;

use session_supervisor::ipc::status::StatusBoard;
use session_supervisor::models::bootstrap::BootstrapState;
use session_supervisor::models::heartbeat::WorkerHeartbeat;
use session_supervisor::models::supervisor::ChildPhase;
use session_supervisor::orchestrator::backoff::RespawnBackoff;
use session_supervisor::orchestrator::spawner::WorkerExit;
use session_supervisor::orchestrator::supervisor::{Supervisor, SupervisorSettings, TickOutcome};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{futures_sessions, FakeLauncher, ManualClock, StopBehaviour};

fn backoff() -> RespawnBackoff {
    RespawnBackoff::new(
        Duration::from_secs(5),
        Duration::from_secs(300),
        Duration::from_secs(300),
    )
}

fn supervisor(launcher: &FakeLauncher, clock: &ManualClock) -> Supervisor<FakeLauncher, ManualClock> {
    Supervisor::new(
        launcher.clone(),
        clock.clone(),
        futures_sessions(),
        SupervisorSettings::default(),
        backoff(),
    )
}

#[tokio::test(start_paused = true)]
async fn idle_outside_session() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(20, 0, 0);
    let mut sup = supervisor(&launcher, &clock);

    assert_eq!(sup.tick().await, TickOutcome::Idle);
    assert_eq!(sup.tick().await, TickOutcome::Idle);
    assert_eq!(launcher.spawn_attempts(), 0);
    assert_eq!(sup.phase(), ChildPhase::Absent);
}

#[tokio::test(start_paused = true)]
async fn spawns_once_and_stays_idle_while_running() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(9, 0, 0);
    let mut sup = supervisor(&launcher, &clock);

    assert_eq!(sup.tick().await, TickOutcome::Spawned { pid: Some(1000) });
    assert_eq!(sup.phase(), ChildPhase::Running);
    assert_eq!(sup.child_pid(), Some(1000));

    for _ in 0..10 {
        clock.advance_secs(5);
        assert_eq!(sup.tick().await, TickOutcome::Idle);
    }
    assert_eq!(launcher.spawn_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn session_end_stops_worker_gracefully() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(19, 0, 0);
    let mut sup = supervisor(&launcher, &clock);
    sup.tick().await;

    clock.set(19, 45, 0);
    assert_eq!(sup.tick().await, TickOutcome::Stopped { forced: false });
    assert!(!sup.has_child());
    assert_eq!(sup.phase(), ChildPhase::Absent);
    assert_eq!(launcher.graceful_requests(0), 1);
    assert_eq!(launcher.kills(0), 0);

    assert_eq!(sup.tick().await, TickOutcome::Idle);
    assert_eq!(launcher.graceful_requests(0), 1);
}

#[tokio::test(start_paused = true)]
async fn stubborn_worker_is_killed_exactly_once_after_grace() {
    let launcher = FakeLauncher::new(StopBehaviour::IgnoreGraceful);
    let clock = ManualClock::at(19, 0, 0);
    let mut sup = supervisor(&launcher, &clock);
    sup.tick().await;

    clock.set(19, 45, 0);
    let started = Instant::now();
    assert_eq!(sup.tick().await, TickOutcome::Stopped { forced: true });

    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(launcher.graceful_requests(0), 1);
    assert_eq!(launcher.kills(0), 1);
    assert!(!sup.has_child());
}

#[tokio::test(start_paused = true)]
async fn unkillable_worker_keeps_handle_and_retries() {
    let launcher = FakeLauncher::new(StopBehaviour::Unkillable);
    let clock = ManualClock::at(19, 0, 0);
    let mut sup = supervisor(&launcher, &clock);
    sup.tick().await;

    clock.set(19, 45, 0);
    assert_eq!(sup.tick().await, TickOutcome::StopFailed);
    assert!(sup.has_child());
    assert_eq!(sup.phase(), ChildPhase::Running);
    assert_eq!(launcher.kills(0), 1);

    assert_eq!(sup.tick().await, TickOutcome::StopFailed);
    assert_eq!(launcher.graceful_requests(0), 2);
    assert_eq!(launcher.kills(0), 2);
    assert_eq!(launcher.spawn_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn crash_during_session_is_replaced_on_next_tick() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(10, 0, 0);
    let mut sup = supervisor(&launcher, &clock);
    sup.tick().await;

    launcher.crash(0, 1);
    assert_eq!(
        sup.tick().await,
        TickOutcome::CrashDetected {
            exit: WorkerExit::with_code(1)
        }
    );
    assert!(!sup.has_child());
    assert_eq!(sup.consecutive_failures(), 1);

    assert_eq!(sup.tick().await, TickOutcome::Spawned { pid: Some(1001) });
    assert_eq!(launcher.spawn_count(), 2);
    assert_eq!(launcher.live_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_crashes_back_off() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(10, 0, 0);
    let mut sup = supervisor(&launcher, &clock);

    sup.tick().await;
    launcher.crash(0, 1);
    sup.tick().await;
    assert!(matches!(sup.tick().await, TickOutcome::Spawned { .. }));

    launcher.crash(1, 1);
    assert!(matches!(sup.tick().await, TickOutcome::CrashDetected { .. }));
    assert_eq!(sup.consecutive_failures(), 2);

    assert_eq!(
        sup.tick().await,
        TickOutcome::SpawnDeferred {
            remaining: Duration::from_secs(5)
        }
    );
    assert_eq!(launcher.spawn_attempts(), 2);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(matches!(sup.tick().await, TickOutcome::Spawned { .. }));
    assert_eq!(launcher.spawn_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn crash_after_long_uptime_starts_fresh_failure_run() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(10, 0, 0);
    let mut sup = supervisor(&launcher, &clock);

    sup.tick().await;
    launcher.crash(0, 1);
    sup.tick().await;
    sup.tick().await;

    tokio::time::advance(Duration::from_secs(600)).await;
    launcher.crash(1, 1);
    sup.tick().await;
    assert_eq!(sup.consecutive_failures(), 1);
    assert!(matches!(sup.tick().await, TickOutcome::Spawned { .. }));
}

#[tokio::test(start_paused = true)]
async fn spawn_failure_is_retried() {
    let launcher = FakeLauncher::cooperative();
    launcher.fail_next_spawns(1);
    let clock = ManualClock::at(10, 0, 0);
    let mut sup = supervisor(&launcher, &clock);

    assert_eq!(sup.tick().await, TickOutcome::SpawnFailed);
    assert_eq!(sup.phase(), ChildPhase::Absent);
    assert_eq!(sup.consecutive_failures(), 1);

    assert!(matches!(sup.tick().await, TickOutcome::Spawned { .. }));
    assert_eq!(launcher.spawn_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn successful_stop_clears_failure_count() {
    let launcher = FakeLauncher::cooperative();
    launcher.fail_next_spawns(1);
    let clock = ManualClock::at(19, 0, 0);
    let mut sup = supervisor(&launcher, &clock);

    sup.tick().await;
    sup.tick().await;
    assert_eq!(sup.consecutive_failures(), 1);

    clock.set(19, 45, 0);
    assert_eq!(sup.tick().await, TickOutcome::Stopped { forced: false });
    assert_eq!(sup.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn worker_exiting_on_its_own_after_session_is_not_a_crash() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(19, 0, 0);
    let mut sup = supervisor(&launcher, &clock);
    sup.tick().await;

    launcher.crash(0, 0);
    clock.set(19, 45, 0);
    assert_eq!(sup.tick().await, TickOutcome::Stopped { forced: false });
    assert_eq!(launcher.graceful_requests(0), 0);
    assert_eq!(sup.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn no_windows_means_no_worker() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(10, 0, 0);
    let mut sup = Supervisor::new(
        launcher.clone(),
        clock.clone(),
        Vec::new(),
        SupervisorSettings::default(),
        backoff(),
    );

    for _ in 0..5 {
        assert_eq!(sup.tick().await, TickOutcome::Idle);
        clock.advance_secs(3600);
    }
    assert_eq!(launcher.spawn_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn publishes_snapshots_to_status_board() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(10, 0, 0);
    let board = Arc::new(StatusBoard::new());
    let mut sup = supervisor(&launcher, &clock).with_status_board(Arc::clone(&board));

    sup.tick().await;
    let snapshot = board.snapshot();
    assert!(snapshot.in_session);
    assert_eq!(snapshot.phase, ChildPhase::Running);
    assert_eq!(snapshot.pid, Some(1000));
    assert_eq!(snapshot.worker_id.as_deref(), Some("worker-0"));
    assert!(snapshot.updated_at.is_some());

    clock.set(19, 45, 0);
    sup.tick().await;
    let snapshot = board.snapshot();
    assert!(!snapshot.in_session);
    assert_eq!(snapshot.phase, ChildPhase::Absent);
    assert_eq!(snapshot.pid, None);
    assert_eq!(snapshot.worker_id, None);
}

const STALE_AFTER: Duration = Duration::from_secs(30);

fn beat(worker_id: &str, pid: u32) -> WorkerHeartbeat {
    WorkerHeartbeat::now(worker_id, pid, BootstrapState::SteadyState)
}

#[tokio::test(start_paused = true)]
async fn silent_worker_is_reported_stale_until_it_beats() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(10, 0, 0);
    let board = Arc::new(StatusBoard::new());
    let mut sup = supervisor(&launcher, &clock).with_status_board(Arc::clone(&board));

    sup.tick().await;
    assert!(!board.snapshot().heartbeat_stale);

    tokio::time::advance(STALE_AFTER).await;
    assert_eq!(sup.tick().await, TickOutcome::Idle);
    assert!(sup.heartbeat_stale());
    assert!(board.snapshot().heartbeat_stale);

    assert!(board.record_heartbeat(beat("worker-0", 1000)));
    sup.tick().await;
    assert!(!sup.heartbeat_stale());
    assert!(!board.snapshot().heartbeat_stale);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_from_a_previous_worker_do_not_count() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(10, 0, 0);
    let board = Arc::new(StatusBoard::new());
    let mut sup = supervisor(&launcher, &clock).with_status_board(Arc::clone(&board));

    sup.tick().await;
    assert!(board.record_heartbeat(beat("worker-0", 1000)));

    launcher.crash(0, 1);
    assert!(matches!(sup.tick().await, TickOutcome::CrashDetected { .. }));
    assert!(!board.snapshot().heartbeat_stale);
    assert_eq!(sup.tick().await, TickOutcome::Spawned { pid: Some(1001) });
    assert!(!board.snapshot().heartbeat_stale);

    assert!(!board.record_heartbeat(beat("worker-0", 1000)));
    tokio::time::advance(STALE_AFTER).await;
    sup.tick().await;
    assert!(board.snapshot().heartbeat_stale);
    assert_eq!(board.snapshot().worker_id.as_deref(), Some("worker-1"));

    assert!(board.record_heartbeat(beat("worker-1", 1001)));
    sup.tick().await;
    assert!(!board.snapshot().heartbeat_stale);
}

#[tokio::test(start_paused = true)]
async fn stale_flag_clears_when_worker_is_stopped() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(19, 0, 0);
    let board = Arc::new(StatusBoard::new());
    let mut sup = supervisor(&launcher, &clock).with_status_board(Arc::clone(&board));

    sup.tick().await;
    tokio::time::advance(STALE_AFTER).await;
    sup.tick().await;
    assert!(board.snapshot().heartbeat_stale);

    clock.set(19, 45, 0);
    assert_eq!(sup.tick().await, TickOutcome::Stopped { forced: false });
    assert!(!board.snapshot().heartbeat_stale);
}

#[tokio::test(start_paused = true)]
async fn shutdown_without_worker_is_idle() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(20, 0, 0);
    let mut sup = supervisor(&launcher, &clock);
    assert_eq!(sup.shutdown().await, TickOutcome::Idle);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_stops_live_worker() {
    let launcher = FakeLauncher::cooperative();
    let clock = ManualClock::at(10, 0, 0);
    let mut sup = supervisor(&launcher, &clock);
    let cancel = CancellationToken::new();

    let task_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        sup.run(task_cancel).await;
        sup
    });

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(launcher.spawn_count(), 1);
    assert_eq!(launcher.live_count(), 1);

    cancel.cancel();
    let sup = handle.await.unwrap();

    assert!(!sup.has_child());
    assert_eq!(launcher.graceful_requests(0), 1);
    assert_eq!(launcher.live_count(), 0);
}
