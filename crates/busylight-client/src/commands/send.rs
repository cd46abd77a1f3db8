//! Send command: delivers one event to the daemon.

use busylight_core::Event;
use busylight_protocol::{Request, Response};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::socket::SocketClient;

pub async fn send(client: &SocketClient, event: Event) -> ClientResult<()> {
    match client.send(Request::notify(event)).await? {
        Response::Ack => {
            debug!(%event, "event queued");
            Ok(())
        }
        other => Err(ClientError::Protocol(format!(
            "unexpected response to notify: {other:?}"
        ))),
    }
}

/// Checks that the daemon is alive.
pub async fn ping(client: &SocketClient) -> ClientResult<()> {
    match client.send(Request::Ping).await? {
        Response::Pong => {
            println!("pong");
            Ok(())
        }
        other => Err(ClientError::Protocol(format!(
            "unexpected response to ping: {other:?}"
        ))),
    }
}
