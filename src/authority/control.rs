//! Control socket: CLI commands reaching a running authority
//!
//! Requests and responses use the same length-prefixed JSON framing as the
//! agent channel, one response per request.

use super::{Authority, ControlRequest, ControlResponse};
use crate::error::{Result, SteadfastError};
use crate::notify::Notifier;
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use steadfast_proto::split;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const SOCKET_FILE: &str = "authority.sock";

pub fn socket_path(state_dir: &Path) -> PathBuf {
    state_dir.join(SOCKET_FILE)
}

/// Bind the control socket. Callers hold the lease, so any existing socket file is stale.
pub fn bind(state_dir: &Path) -> Result<UnixListener> {
    let path = socket_path(state_dir);
    match std::fs::remove_file(&path) {
        Ok(()) => debug!(path = %path.display(), "Removed stale control socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let listener = UnixListener::bind(&path)?;
    info!(path = %path.display(), "Control socket listening");
    Ok(listener)
}

pub fn unbind(state_dir: &Path) {
    let path = socket_path(state_dir);
    if let Err(e) = std::fs::remove_file(&path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove control socket");
        }
    }
}

/// Accept connections until cancelled
pub async fn serve<N>(
    listener: UnixListener,
    authority: Arc<Mutex<Authority<N>>>,
    max_frame_bytes: usize,
    cancel: CancellationToken,
) where
    N: Notifier + 'static,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let authority = Arc::clone(&authority);
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = handle_connection(stream, authority, max_frame_bytes) => {}
                        }
                    });
                }
                Err(e) => warn!(error = %e, "Failed to accept control connection"),
            },
        }
    }
    debug!("Control server stopped");
}

async fn handle_connection<N: Notifier>(
    stream: UnixStream,
    authority: Arc<Mutex<Authority<N>>>,
    max_frame_bytes: usize,
) {
    let (mut reader, sender) = split(stream, max_frame_bytes);
    loop {
        let response = match reader.recv_value().await {
            Ok(None) => return,
            Ok(Some(value)) => match serde_json::from_value::<ControlRequest>(value) {
                Ok(request) => {
                    debug!(request = request.name(), "Control request");
                    let mut authority = authority.lock().await;
                    authority
                        .handle(request, Utc::now())
                        .unwrap_or_else(|e| ControlResponse::error(e.to_string()))
                }
                Err(e) => ControlResponse::error(format!("invalid request: {}", e)),
            },
            Err(e) if e.is_fatal() => {
                warn!(error = %e, "Control connection dropped");
                return;
            }
            Err(e) => ControlResponse::error(e.to_string()),
        };
        if let Err(e) = sender.send_value(&response).await {
            debug!(error = %e, "Control client went away");
            return;
        }
    }
}

/// Send one request to the daemon; `None` if no daemon is listening
pub async fn request(
    state_dir: &Path,
    request: &ControlRequest,
    max_frame_bytes: usize,
) -> Result<Option<ControlResponse>> {
    let stream = match UnixStream::connect(socket_path(state_dir)).await {
        Ok(stream) => stream,
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
            ) =>
        {
            debug!("No authority listening, acting in-process");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let (mut reader, sender) = split(stream, max_frame_bytes);
    sender.send_value(request).await?;
    let value = reader
        .recv_value()
        .await?
        .ok_or_else(|| SteadfastError::Control("authority closed the connection".to_string()))?;
    let response = serde_json::from_value(value)
        .map_err(|e| SteadfastError::Control(format!("invalid response: {}", e)))?;
    Ok(Some(response))
}
