//! Per-connection server façade.
//!
//! The accept loop belongs to the application; each accepted stream becomes
//! one [`ServerSocket`] that goes `Connected → Disconnected` exactly once.

use bytes::Bytes;
use compio::net::TcpStream;
use futures::future::LocalBoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tether_core::alloc::BufferPool;
use tether_core::cancel::CancellationToken;
use tether_core::endpoint::Endpoint;
use tether_core::error::Result;
use tether_core::executor::{CompioExecutor, Executor};
use tether_core::monitor::{ConnectionMonitor, PING_FRAME};
use tether_core::options::SocketOptions;
use tether_core::status::{CloseResult, MessageKind, SendStatus, Status};
use tracing::{debug, warn};

use crate::event::{EventHub, EventStream, SocketEvent};
use crate::managed::{InboundHandler, ManagedSocket, Message};

struct ServerState {
    status: Status,
    monitor: Option<ConnectionMonitor>,
    last_close: Option<CloseResult>,
}

struct ServerInner {
    socket: ManagedSocket,
    peer: SocketAddr,
    events: EventHub,
    state: Mutex<ServerState>,
}

/// Server side of one accepted connection.
///
/// Cloning yields another handle to the same connection.
///
/// # Example
///
/// ```rust,no_run
/// use compio::net::TcpListener;
/// use tether_core::options::SocketOptions;
/// use tether_wire::{ServerSocket, SocketEvent};
///
/// #[compio::main]
/// async fn main() -> std::io::Result<()> {
///     let listener = TcpListener::bind("127.0.0.1:9000").await?;
///     loop {
///         let (stream, _) = listener.accept().await?;
///         let (socket, events) = ServerSocket::from_tcp(stream, SocketOptions::default()).unwrap();
///         compio::runtime::spawn(async move {
///             while let Ok(event) = events.recv_async().await {
///                 println!("{}: {event}", socket.peer_addr());
///             }
///         })
///         .detach();
///     }
/// }
/// ```
#[derive(Clone)]
pub struct ServerSocket {
    inner: Arc<ServerInner>,
}

impl ServerSocket {
    /// Wrap an accepted stream with a private buffer pool.
    ///
    /// Returns the socket and an event stream subscribed before the first read,
    /// which already holds the `Connected` event.
    pub fn from_tcp(stream: TcpStream, options: SocketOptions) -> Result<(Self, EventStream)> {
        Self::with_executor(stream, options, Arc::new(BufferPool::new()), Arc::new(CompioExecutor))
    }

    /// Wrap an accepted stream sharing `pool` and `executor`.
    pub fn with_executor(
        stream: TcpStream,
        options: SocketOptions,
        pool: Arc<BufferPool>,
        executor: Arc<dyn Executor>,
    ) -> Result<(Self, EventStream)> {
        let peer = stream.peer_addr()?;
        if options.heartbeat_shares_raw_stream() {
            warn!(%peer, "heartbeat pings will be mixed into the raw byte stream");
        }
        let options = Arc::new(options);
        let monitor = options.monitor.create(&options);

        // the handler needs the façade, the façade needs the socket
        let slot: Arc<Mutex<Weak<ServerInner>>> = Arc::new(Mutex::new(Weak::new()));
        let handler = Self::inbound_handler(slot.clone(), monitor.clone());
        let socket = ManagedSocket::server(stream, options, pool, executor.clone(), Some(handler))?;

        let inner = Arc::new(ServerInner {
            socket: socket.clone(),
            peer,
            events: EventHub::default(),
            state: Mutex::new(ServerState {
                status: Status::Connected,
                monitor: None,
                last_close: None,
            }),
        });
        let events = inner.events.subscribe();

        // emit Connected before releasing messages to subscribers
        {
            let mut state = inner.state.lock();
            *slot.lock() = Arc::downgrade(&inner);
            let endpoint = Endpoint::Tcp(peer);
            debug!(%endpoint, "server connection accepted");
            inner.events.emit(SocketEvent::Connected(endpoint));

            let pinger_socket = socket.clone();
            let weak = Arc::downgrade(&inner);
            monitor.start(
                &executor,
                move || -> LocalBoxFuture<'static, SendStatus> {
                    let socket = pinger_socket.clone();
                    Box::pin(async move {
                        socket
                            .send(Bytes::from_static(&PING_FRAME), MessageKind::Binary, &CancellationToken::new())
                            .await
                            .unwrap_or(SendStatus::Closed)
                    })
                },
                move || {
                    if let Some(inner) = weak.upgrade() {
                        debug!("heartbeat lost");
                        if inner.teardown(CloseResult::remote()) {
                            inner.socket.close_now();
                        }
                    }
                },
            );
            state.monitor = Some(monitor);
        }

        if let Some(closed) = socket.closed() {
            let weak = Arc::downgrade(&inner);
            executor.spawn(Box::pin(async move {
                let result = closed.await;
                if let Some(inner) = weak.upgrade() {
                    inner.teardown(result);
                }
            }));
        }

        Ok((Self { inner }, events))
    }

    fn inbound_handler(
        slot: Arc<Mutex<Weak<ServerInner>>>,
        monitor: ConnectionMonitor,
    ) -> Arc<dyn InboundHandler> {
        Arc::new(move |message: Message| {
            if let Message::Binary(data) = &message {
                if monitor.observe(data) {
                    return;
                }
            }
            let Some(inner) = slot.lock().upgrade() else {
                return;
            };
            let state = inner.state.lock();
            if state.status != Status::Connected {
                return;
            }
            inner.events.emit(match message {
                Message::Text(text) => SocketEvent::Text(text),
                Message::Binary(data) => SocketEvent::Binary(data),
            });
        })
    }

    /// Register an additional event subscriber.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.inner.state.lock().status
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status() == Status::Connected
    }

    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer
    }

    /// How the connection ended, once it has.
    #[must_use]
    pub fn last_close(&self) -> Option<CloseResult> {
        self.inner.state.lock().last_close.clone()
    }

    /// Send a text message.
    pub async fn send_text(&self, text: &str, cancel: &CancellationToken) -> Result<SendStatus> {
        self.send(Bytes::copy_from_slice(text.as_bytes()), MessageKind::Text, cancel)
            .await
    }

    /// Send a binary message.
    pub async fn send_binary(
        &self,
        data: impl Into<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<SendStatus> {
        self.send(data.into(), MessageKind::Binary, cancel).await
    }

    async fn send(&self, payload: Bytes, kind: MessageKind, cancel: &CancellationToken) -> Result<SendStatus> {
        if cancel.is_cancelled() {
            return Ok(SendStatus::Canceled);
        }
        if !self.is_connected() {
            return Ok(SendStatus::Closed);
        }
        self.inner.socket.send(payload, kind, cancel).await
    }

    /// Close the connection. Fires `Disconnected(ClosedLocal)` once.
    pub async fn disconnect(&self) {
        if self.inner.teardown(CloseResult::local()) {
            self.inner.socket.disconnect().await;
        }
    }
}

impl ServerInner {
    /// Single transition to Disconnected; returns false if already there.
    fn teardown(&self, result: CloseResult) -> bool {
        let mut state = self.state.lock();
        if state.status == Status::Disconnected {
            return false;
        }
        state.status = Status::Disconnected;
        if let Some(monitor) = state.monitor.take() {
            monitor.stop();
        }
        debug!(peer = %self.peer, %result, "server connection closed");
        if let Some(err) = result.error() {
            self.events.emit(SocketEvent::Error(err.clone()));
        }
        state.last_close = Some(result.clone());
        self.events.emit(SocketEvent::Disconnected(result));
        true
    }
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        if let Some(monitor) = self.state.get_mut().monitor.take() {
            monitor.stop();
        }
        self.socket.close_now();
    }
}

impl fmt::Debug for ServerSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSocket")
            .field("peer", &self.inner.peer)
            .field("status", &self.status())
            .finish()
    }
}
