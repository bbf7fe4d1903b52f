//! Local status server for worker heartbeats and ctl queries.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON requests.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "heartbeat", "worker_id": "…", "pid": 4242, "state": "steady_state", "sent_at": "…"}
//! {"command": "status"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "unknown worker"}
//! ```

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::ipc::status::StatusBoard;
use crate::ipc::{IpcRequest, IpcResponse};
use crate::{AppError, Result};

/// Spawn the status server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_status_server(
    ipc_name: &str,
    board: Arc<StatusBoard>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = ipc_name.to_owned();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "status server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("status_server", name = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("status server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                let board = Arc::clone(&board);
                                tokio::spawn(handle_connection(stream, board, ct.clone()));
                            }
                            Err(err) => {
                                warn!(%err, "ipc accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Handle a single client connection.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    board: Arc<StatusBoard>,
    ct: CancellationToken,
) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            let read = tokio::select! {
                () = ct.cancelled() => break,
                read = buf_reader.read_line(&mut line) => read,
            };
            match read {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = handle_line(trimmed, &board);

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        debug!("ipc connection closed");
    }
    .instrument(span)
    .await;
}

/// Parse and dispatch one request line.
#[must_use]
pub fn handle_line(line: &str, board: &StatusBoard) -> IpcResponse {
    match serde_json::from_str::<IpcRequest>(line) {
        Ok(request) => dispatch(request, board),
        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
    }
}

/// Route a request to its handler.
#[must_use]
pub fn dispatch(request: IpcRequest, board: &StatusBoard) -> IpcResponse {
    match request {
        IpcRequest::Heartbeat(heartbeat) => {
            let worker_id = heartbeat.worker_id.clone();
            let state = heartbeat.state;
            if board.record_heartbeat(heartbeat) {
                debug!(worker_id, %state, "heartbeat recorded");
                IpcResponse::success(serde_json::json!({ "accepted": true }))
            } else {
                debug!(worker_id, "heartbeat from unknown worker ignored");
                IpcResponse::error("unknown worker")
            }
        }
        IpcRequest::Status => IpcResponse::success(serde_json::json!({
            "supervisor": board.snapshot(),
            "heartbeat": board.latest_heartbeat(),
        })),
    }
}
