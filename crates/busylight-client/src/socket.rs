//! Unix socket client for the busylight daemon.

use std::path::{Path, PathBuf};
use std::time::Duration;

use busylight_protocol::{Envelope, Request, Response, read_message, write_message};
use tokio::net::UnixStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};

/// Client for the daemon's control socket.
pub struct SocketClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl SocketClient {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    /// Creates a client for the default socket path.
    pub fn with_defaults() -> Self {
        Self::new(busylight_server::default_socket_path(), Duration::from_secs(5))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sends one request and waits for its response.
    ///
    /// Error responses from the daemon are returned as [`ClientError::Rejected`].
    pub async fn send(&self, request: Request) -> ClientResult<Response> {
        let request_id = Uuid::new_v4().to_string();
        let envelope = Envelope::request(&request_id, request);

        debug!(
            socket = %self.socket_path.display(),
            request_id = %request_id,
            "connecting to daemon"
        );

        let mut stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| {
                ClientError::Timeout(format!(
                    "connecting to {} after {}s",
                    self.socket_path.display(),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                ClientError::Connection(format!(
                    "failed to connect to {} ({e}); is the daemon running?",
                    self.socket_path.display()
                ))
            })?;

        tokio::time::timeout(self.timeout, write_message(&mut stream, &envelope))
            .await
            .map_err(|_| ClientError::Timeout("sending request".into()))??;

        let reply: Envelope<Response> =
            tokio::time::timeout(self.timeout, read_message(&mut stream))
                .await
                .map_err(|_| ClientError::Timeout("reading response".into()))??
                .ok_or_else(|| ClientError::Connection("daemon closed the connection".into()))?;

        if reply.request_id != request_id {
            warn!(
                expected = %request_id,
                received = %reply.request_id,
                "response request_id mismatch"
            );
        }
        debug!(request_id = %reply.request_id, "response received");

        match reply.payload {
            Response::Error { error } => Err(ClientError::Rejected(error)),
            payload => Ok(payload),
        }
    }

    /// Returns true if the daemon answers a ping.
    pub async fn ping(&self) -> bool {
        matches!(self.send(Request::Ping).await, Ok(Response::Pong))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busylight_core::Event;
    use busylight_protocol::ErrorCode;
    use tempfile::tempdir;
    use tokio::net::UnixListener;

    /// Answers every request with a canned response.
    fn serve(listener: UnixListener, reply: fn(&Request) -> Response) {
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                while let Ok(Some(request)) =
                    read_message::<_, Envelope<Request>>(&mut stream).await
                {
                    let response =
                        Envelope::response(request.request_id.clone(), reply(&request.payload));
                    write_message(&mut stream, &response).await.unwrap();
                }
            }
        });
    }

    #[test]
    fn default_client() {
        let client = SocketClient::with_defaults();
        assert!(client.socket_path().to_string_lossy().contains("busylight"));
    }

    #[tokio::test]
    async fn ping_and_notify() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("busylight.sock");
        serve(UnixListener::bind(&path).unwrap(), |request| match request {
            Request::Ping => Response::Pong,
            Request::Notify { .. } => Response::Ack,
            Request::Status => Response::error(ErrorCode::InternalError, "no status"),
        });

        let client = SocketClient::new(&path, Duration::from_secs(2));
        assert_eq!(
            client.send(Request::notify(Event::ZoomEnded)).await.unwrap(),
            Response::Ack
        );

        let err = client.send(Request::Status).await.unwrap_err();
        let ClientError::Rejected(error) = err else {
            panic!("expected rejection");
        };
        assert_eq!(error.code, ErrorCode::InternalError);
    }

    #[tokio::test]
    async fn ping_result() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("busylight.sock");
        let client = SocketClient::new(&path, Duration::from_secs(2));
        assert!(!client.ping().await);

        serve(UnixListener::bind(&path).unwrap(), |_| Response::Pong);
        assert!(client.ping().await);
    }

    #[tokio::test]
    async fn missing_daemon_is_a_connection_error() {
        let dir = tempdir().unwrap();
        let client = SocketClient::new(dir.path().join("absent.sock"), Duration::from_secs(1));
        let err = client.send(Request::Ping).await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
        assert!(err.to_string().contains("is the daemon running"));
    }
}
