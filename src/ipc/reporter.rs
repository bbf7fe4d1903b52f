//! Worker-side heartbeat client.
//!
//! Sends the worker's current bootstrap state to the supervisor's status
//! server on a fixed cadence. Reporting is best effort: a failed connect
//! or write is logged once and the reporter stops.

use std::time::Duration;

use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::{GenericNamespaced, ToNsName};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ipc::{IpcRequest, IpcResponse};
use crate::models::bootstrap::BootstrapState;
use crate::models::heartbeat::WorkerHeartbeat;

/// Spawn the heartbeat reporter task.
///
/// The task runs until `cancel` fires or the connection fails.
#[must_use]
pub fn spawn_heartbeat_reporter(
    ipc_name: String,
    worker_id: String,
    interval: Duration,
    states: watch::Receiver<BootstrapState>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stream = match connect(&ipc_name).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(ipc_name, %err, "status channel unavailable; heartbeat reporting disabled");
                return;
            }
        };
        info!(ipc_name, worker_id, "heartbeat reporter connected");

        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut ticker = tokio::time::interval(interval);
        let pid = std::process::id();
        let mut response = String::new();

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("heartbeat reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let state = *states.borrow();
            let request = IpcRequest::Heartbeat(WorkerHeartbeat::now(worker_id.clone(), pid, state));
            let mut line = match serde_json::to_string(&request) {
                Ok(line) => line,
                Err(err) => {
                    warn!(%err, "failed to encode heartbeat");
                    continue;
                }
            };
            line.push('\n');

            if let Err(err) = writer.write_all(line.as_bytes()).await {
                warn!(%err, "heartbeat write failed; reporting disabled");
                break;
            }

            response.clear();
            match reader.read_line(&mut response).await {
                Ok(0) => {
                    warn!("status server closed the connection; reporting disabled");
                    break;
                }
                Ok(_) => log_response(response.trim()),
                Err(err) => {
                    warn!(%err, "heartbeat response read failed; reporting disabled");
                    break;
                }
            }
        }
    })
}

async fn connect(ipc_name: &str) -> std::io::Result<Stream> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    Stream::connect(name).await
}

fn log_response(raw: &str) {
    match serde_json::from_str::<IpcResponse>(raw) {
        Ok(IpcResponse { ok: true, .. }) => {}
        Ok(IpcResponse { error, .. }) => {
            debug!(error = error.unwrap_or_default(), "heartbeat not accepted");
        }
        Err(err) => debug!(%err, "unparseable heartbeat response"),
    }
}
