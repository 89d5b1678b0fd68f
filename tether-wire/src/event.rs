//! Socket lifecycle and message events.
//!
//! Every subscriber gets its own unbounded channel, so a slow or dropped
//! subscriber never blocks the connection and never sees another's events.

use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tether_core::endpoint::Endpoint;
use tether_core::error::TetherError;
use tether_core::status::CloseResult;

/// Events emitted by [`ClientSocket`](crate::ClientSocket) and
/// [`ServerSocket`](crate::ServerSocket).
///
/// Per subscriber and per connection the order is
/// `Connected`, then any messages, then `Disconnected`.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// Connection established.
    Connected(Endpoint),
    /// Connection ended; carries the reason.
    Disconnected(CloseResult),
    /// A connection attempt or the transport failed.
    Error(Arc<TetherError>),
    /// Text message received.
    Text(String),
    /// Binary message received.
    Binary(Bytes),
}

impl fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected(ep) => write!(f, "Connected to {ep}"),
            Self::Disconnected(result) => write!(f, "Disconnected ({result})"),
            Self::Error(err) => write!(f, "Error: {err}"),
            Self::Text(text) => write!(f, "Text ({} bytes)", text.len()),
            Self::Binary(data) => write!(f, "Binary ({} bytes)", data.len()),
        }
    }
}

/// Handle for receiving socket events.
pub type EventStream = flume::Receiver<SocketEvent>;

/// Registered subscribers of one façade.
#[derive(Debug, Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<flume::Sender<SocketEvent>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self) -> EventStream {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, forgetting dropped ones.
    pub(crate) fn emit(&self, event: SocketEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
