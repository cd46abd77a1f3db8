//! Control socket.
//!
//! Accepts protocol v1 connections on a Unix socket and turns requests into
//! loop inputs. Several requests may be sent on one connection; each gets
//! exactly one response.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use busylight_protocol::{
    Envelope, ErrorCode, PROTOCOL_VERSION, ProtocolError, Request, Response, read_message,
    write_message,
};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::event_loop::LoopInput;

/// Idle time after which a connection is dropped.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest a status request waits for the loop.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CONNECTIONS: usize = 16;

pub struct ControlServer {
    path: PathBuf,
    listener: UnixListener,
    permits: Arc<Semaphore>,
}

impl ControlServer {
    /// Binds the socket, replacing a stale one left by a dead daemon.
    ///
    /// A socket that still accepts connections means another daemon owns it.
    pub async fn bind(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(ServerError::socket_path_invalid(parent.to_string_lossy()));
        }

        if path.exists() {
            if UnixStream::connect(&path).await.is_ok() {
                return Err(ServerError::socket_in_use(path.to_string_lossy()));
            }
            info!(path = %path.display(), "Removing stale socket");
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        info!(path = %path.display(), "Control socket listening");

        Ok(Self {
            path,
            listener,
            permits: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts connections forever, one task per connection.
    pub async fn serve(&self, inputs: mpsc::Sender<LoopInput>) {
        loop {
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                return;
            };
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    debug!("Accepted control connection");
                    let inputs = inputs.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, inputs).await {
                            debug!(error = %e, "Control connection ended with error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => error!(error = %e, "Failed to accept control connection"),
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove socket file"),
        }
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    inputs: mpsc::Sender<LoopInput>,
) -> ServerResult<()> {
    loop {
        let read = tokio::time::timeout(
            DEFAULT_CONNECTION_TIMEOUT,
            read_message::<_, Envelope<serde_json::Value>>(&mut stream),
        )
        .await;

        let (request_id, response) = match read {
            Err(_) => {
                debug!("Control connection idle, closing");
                return Ok(());
            }
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(ProtocolError::Serialization(e))) => {
                warn!(error = %e, "Malformed control message");
                (
                    String::new(),
                    Response::error(ErrorCode::InvalidRequest, format!("malformed message: {e}")),
                )
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(Some(envelope))) => {
                let response = if envelope.is_compatible() {
                    match serde_json::from_value::<Request>(envelope.payload) {
                        Ok(request) => dispatch(request, &inputs).await,
                        Err(e) => Response::error(
                            ErrorCode::InvalidRequest,
                            format!("unknown request: {e}"),
                        ),
                    }
                } else {
                    warn!(
                        version = %envelope.protocol_version,
                        expected = PROTOCOL_VERSION,
                        "Incompatible protocol version"
                    );
                    Response::error(
                        ErrorCode::InvalidRequest,
                        format!(
                            "unsupported protocol version {} (expected {PROTOCOL_VERSION})",
                            envelope.protocol_version
                        ),
                    )
                };
                (envelope.request_id, response)
            }
        };

        let reply = Envelope::response(request_id, response);
        tokio::time::timeout(DEFAULT_CONNECTION_TIMEOUT, write_message(&mut stream, &reply))
            .await
            .map_err(|_| ServerError::timeout("control response"))??;
    }
}

async fn dispatch(request: Request, inputs: &mpsc::Sender<LoopInput>) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::Notify { event } => {
            debug!(%event, "Queueing event from control socket");
            match inputs.send(LoopInput::Event(event)).await {
                Ok(()) => Response::Ack,
                Err(_) => shutting_down(),
            }
        }
        Request::Status => {
            let (reply, rx) = oneshot::channel();
            if inputs.send(LoopInput::Status(reply)).await.is_err() {
                return shutting_down();
            }
            match tokio::time::timeout(STATUS_TIMEOUT, rx).await {
                Ok(Ok(info)) => Response::status(info),
                Ok(Err(_)) => shutting_down(),
                Err(_) => Response::error(ErrorCode::Timeout, "control loop did not answer"),
            }
        }
    }
}

fn shutting_down() -> Response {
    Response::error(ErrorCode::ShuttingDown, "daemon is shutting down")
}
