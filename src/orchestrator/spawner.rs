//! Worker process spawner and process-control primitives.
//!
//! The supervisor drives its child exclusively through [`WorkerLauncher`]
//! and [`WorkerProcess`] so the control loop can be exercised with fake
//! processes. [`CommandLauncher`] is the real implementation:
//! - `kill_on_drop(true)` so a dropped handle never leaks a worker.
//! - `env_clear()` + a safe variable allowlist.
//! - A fresh worker id in [`WORKER_ID_ENV`] so heartbeats from a previous
//!   worker are never mistaken for the current one.
//! - Graceful stop is `SIGTERM` on Unix; other platforms only support an
//!   immediate kill.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::info;
use uuid::Uuid;

use crate::config::{WorkerConfig, AUTH_CODE_ENV, PASSWORD_ENV};
use crate::{AppError, Result};

/// Environment variable carrying the supervisor-assigned worker id.
pub const WORKER_ID_ENV: &str = "SESSION_SUPERVISOR_WORKER_ID";

/// Environment variables inherited by the worker process.
///
/// Every other variable from the supervisor's environment is stripped via
/// `env_clear()` before the child is launched.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "TZ",
    "LANG",
    "USER",
    "XDG_RUNTIME_DIR",
    "DBUS_SESSION_BUS_ADDRESS",
    PASSWORD_ENV,
    AUTH_CODE_ENV,
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
];

/// Boxed future returned by process-control operations.
pub type ProcessFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Exit status of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, absent when terminated by a signal.
    pub code: Option<i32>,
    /// Terminating signal on Unix.
    pub signal: Option<i32>,
}

impl WorkerExit {
    /// Exit with a plain status code.
    #[must_use]
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Exit caused by a signal.
    #[must_use]
    pub fn by_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Whether the worker exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for WorkerExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl Display for WorkerExit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(0), _) => f.write_str("exited normally (code 0)"),
            (Some(code), _) => write!(f, "exited with code {code}"),
            (None, Some(signal)) => write!(f, "terminated by signal {signal}"),
            (None, None) => f.write_str("terminated by signal"),
        }
    }
}

/// Result of a bounded wait on a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The worker exited within the timeout.
    Exited(WorkerExit),
    /// The timeout elapsed first.
    TimedOut,
}

/// Handle to one running worker process.
pub trait WorkerProcess: Send {
    /// OS process id, if the process has not been reaped.
    fn id(&self) -> Option<u32>;

    /// Supervisor-assigned identifier.
    fn worker_id(&self) -> &str;

    /// Ask the worker to shut down cooperatively.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the signal cannot be delivered.
    fn request_graceful_stop(&mut self) -> Result<()>;

    /// Kill the worker unconditionally.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the kill cannot be issued.
    fn force_kill(&mut self) -> Result<()>;

    /// Non-blocking exit check.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the status cannot be queried.
    fn try_wait(&mut self) -> Result<Option<WorkerExit>>;

    /// Wait up to `timeout` for the worker to exit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if waiting fails.
    fn wait(&mut self, timeout: Duration) -> ProcessFuture<'_, WaitOutcome>;
}

/// Starts worker processes.
pub trait WorkerLauncher: Send + Sync {
    /// Process handle type produced by [`spawn`](Self::spawn).
    type Process: WorkerProcess;

    /// Start a new worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the OS refuses to start the process.
    fn spawn(&self) -> Result<Self::Process>;
}

/// Launches the worker as an OS process.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLauncher {
    /// Launcher for an explicit program and argument list.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from the `[worker]` section.
    ///
    /// Without a configured program the current executable is relaunched
    /// with `default_args`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the current executable cannot be
    /// resolved.
    pub fn from_config(worker: &WorkerConfig, default_args: Vec<String>) -> Result<Self> {
        if let Some(ref program) = worker.program {
            return Ok(Self::new(program, worker.args.clone()));
        }

        let program = std::env::current_exe()
            .map_err(|err| AppError::Config(format!("cannot resolve current executable: {err}")))?;
        let args = if worker.args.is_empty() {
            default_args
        } else {
            worker.args.clone()
        };
        Ok(Self::new(program, args))
    }

    /// Program that will be executed.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl WorkerLauncher for CommandLauncher {
    type Process = ChildProcess;

    fn spawn(&self) -> Result<ChildProcess> {
        let worker_id = Uuid::new_v4().to_string();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        cmd.env(WORKER_ID_ENV, &worker_id);

        // Worker logs go straight to the supervisor's output.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|err| {
            AppError::Process(format!(
                "failed to spawn worker '{}': {err}",
                self.program.display()
            ))
        })?;

        info!(
            worker_id,
            pid = child.id().unwrap_or(0),
            program = %self.program.display(),
            "worker process spawned"
        );

        Ok(ChildProcess { child, worker_id })
    }
}

/// A worker running as a `tokio` child process.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    worker_id: String,
}

impl WorkerProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn worker_id(&self) -> &str {
        &self.worker_id
    }

    #[cfg(unix)]
    fn request_graceful_stop(&mut self) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = self
            .child
            .id()
            .ok_or_else(|| AppError::Process("worker already reaped".into()))?;
        let raw = i32::try_from(pid)
            .map_err(|_| AppError::Process(format!("pid {pid} out of range")))?;
        kill(Pid::from_raw(raw), Signal::SIGTERM)
            .map_err(|err| AppError::Process(format!("failed to send SIGTERM: {err}")))
    }

    #[cfg(not(unix))]
    fn request_graceful_stop(&mut self) -> Result<()> {
        // No cooperative signal available; the grace wait still applies.
        self.force_kill()
    }

    fn force_kill(&mut self) -> Result<()> {
        self.child
            .start_kill()
            .map_err(|err| AppError::Process(format!("failed to kill worker: {err}")))
    }

    fn try_wait(&mut self) -> Result<Option<WorkerExit>> {
        self.child
            .try_wait()
            .map(|status| status.map(WorkerExit::from))
            .map_err(|err| AppError::Process(format!("failed to poll worker: {err}")))
    }

    fn wait(&mut self, timeout: Duration) -> ProcessFuture<'_, WaitOutcome> {
        Box::pin(async move {
            match tokio::time::timeout(timeout, self.child.wait()).await {
                Ok(Ok(status)) => Ok(WaitOutcome::Exited(status.into())),
                Ok(Err(err)) => Err(AppError::Process(format!(
                    "failed to wait for worker: {err}"
                ))),
                Err(_elapsed) => Ok(WaitOutcome::TimedOut),
            }
        })
    }
}
