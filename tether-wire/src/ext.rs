//! Awaitable lifecycle helpers.
//!
//! Turn the event stream of a façade into futures: wait until a socket is
//! connected, or until it disconnects.

use tether_core::cancel::{or_cancel, CancellationToken};
use tether_core::error::{Result, TetherError};
use tether_core::status::{CloseResult, CloseStatus, Status};

use crate::client::ClientSocket;
use crate::event::{EventStream, SocketEvent};
use crate::server::ServerSocket;

/// What the helpers need from a façade.
pub trait Lifecycle {
    fn status(&self) -> Status;
    fn subscribe(&self) -> EventStream;
    fn last_close(&self) -> Option<CloseResult>;
}

impl Lifecycle for ClientSocket {
    fn status(&self) -> Status {
        ClientSocket::status(self)
    }

    fn subscribe(&self) -> EventStream {
        ClientSocket::subscribe(self)
    }

    fn last_close(&self) -> Option<CloseResult> {
        ClientSocket::last_close(self)
    }
}

impl Lifecycle for ServerSocket {
    fn status(&self) -> Status {
        ServerSocket::status(self)
    }

    fn subscribe(&self) -> EventStream {
        ServerSocket::subscribe(self)
    }

    fn last_close(&self) -> Option<CloseResult> {
        ServerSocket::last_close(self)
    }
}

/// Wait until `socket` is connected.
///
/// Failed attempts keep waiting while the client retries. Fails with
/// [`TetherError::Canceled`] when `cancel` fires, with
/// [`TetherError::Disconnected`] when the socket is (or gets) disconnected,
/// and with [`TetherError::ReconnectExhausted`] when the client gives up.
pub async fn when_connected<S: Lifecycle + ?Sized>(socket: &S, cancel: &CancellationToken) -> Result<()> {
    let events = socket.subscribe();
    wait_connected(socket, &events, cancel).await
}

pub(crate) async fn wait_connected<S: Lifecycle + ?Sized>(
    socket: &S,
    events: &EventStream,
    cancel: &CancellationToken,
) -> Result<()> {
    match socket.status() {
        Status::Connected => return Ok(()),
        Status::Disconnected => return Err(TetherError::Disconnected),
        Status::Connecting => {}
    }

    // from here on the subscription sees every transition
    loop {
        match or_cancel(events.recv_async(), cancel).await {
            None => return Err(TetherError::Canceled),
            Some(Err(_)) => return Err(TetherError::Disconnected),
            Some(Ok(SocketEvent::Connected(_))) => return Ok(()),
            Some(Ok(SocketEvent::Disconnected(result))) if result.status() == CloseStatus::ClosedLocal => {
                return Err(TetherError::Disconnected)
            }
            Some(Ok(SocketEvent::Error(err))) => {
                if let TetherError::ReconnectExhausted { attempts } = *err {
                    return Err(TetherError::ReconnectExhausted { attempts });
                }
            }
            Some(Ok(_)) => {}
        }
    }
}

/// Wait for the next disconnection of `socket`.
///
/// Resolves immediately with the last close result if the socket is already
/// disconnected. For a client this includes disconnections followed by a
/// reconnect. Fails with [`TetherError::Canceled`] when `cancel` fires.
pub async fn when_disconnected<S: Lifecycle + ?Sized>(
    socket: &S,
    cancel: &CancellationToken,
) -> Result<CloseResult> {
    let events = socket.subscribe();
    if socket.status() == Status::Disconnected {
        return Ok(socket.last_close().unwrap_or_else(CloseResult::local));
    }
    loop {
        match or_cancel(events.recv_async(), cancel).await {
            None => return Err(TetherError::Canceled),
            Some(Err(_)) => return Ok(socket.last_close().unwrap_or_else(CloseResult::local)),
            Some(Ok(SocketEvent::Disconnected(result))) => return Ok(result),
            Some(Ok(_)) => {}
        }
    }
}
