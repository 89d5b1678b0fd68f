//! Reconnecting client façade.
//!
//! [`ClientSocket`] drives one [`ManagedSocket`] per connection attempt and
//! owns the state machine:
//!
//! ```text
//! Disconnected ──connect──> Connecting ──attempt ok──> Connected
//!      ^                     ^    │                        │
//!      │                     │    └─attempt failed─┐       │ lost / closed
//!      │                     └──reconnect delay────┴───────┘
//!      └──────────────────────── disconnect ─────────────────
//! ```
//!
//! Every transition happens under one lock and bumps the generation counter
//! when a connection cycle ends, so completions from an older cycle (a late
//! connect, a closure watcher, a heartbeat timer) are recognized and dropped.
//! Events are emitted while holding the lock, which keeps the per-subscriber
//! order `Connected`, messages, `Disconnected` for each generation.

use bytes::Bytes;
use futures::future::LocalBoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tether_core::alloc::BufferPool;
use tether_core::cancel::CancellationToken;
use tether_core::endpoint::Endpoint;
use tether_core::error::{Result, TetherError};
use tether_core::executor::{CompioExecutor, Executor};
use tether_core::monitor::{ConnectionMonitor, PING_FRAME};
use tether_core::options::SocketOptions;
use tether_core::reconnect::ReconnectState;
use tether_core::status::{CloseResult, MessageKind, SendStatus, Status};
use tracing::{debug, warn};

use crate::event::{EventHub, EventStream, SocketEvent};
use crate::managed::{ManagedSocket, Message};

struct ClientState {
    status: Status,
    endpoint: Option<Endpoint>,
    socket: Option<ManagedSocket>,
    generation: u64,
    attempt_cancel: Option<CancellationToken>,
    reconnect: ReconnectState,
    monitor: Option<ConnectionMonitor>,
    last_close: Option<CloseResult>,
}

struct ClientInner {
    options: Arc<SocketOptions>,
    pool: Arc<BufferPool>,
    executor: Arc<dyn Executor>,
    events: EventHub,
    state: Mutex<ClientState>,
}

/// Client side of a managed connection with automatic reconnection.
///
/// Cloning yields another handle to the same client. Dropping the last
/// handle closes the connection and cancels any pending reconnect.
///
/// # Example
///
/// ```rust,no_run
/// use tether_wire::{ClientSocket, SocketEvent};
/// use tether_core::cancel::CancellationToken;
/// use tether_core::options::SocketOptions;
///
/// #[compio::main]
/// async fn main() {
///     let client = ClientSocket::new(SocketOptions::default());
///     let events = client.subscribe();
///     client.connect("tcp://127.0.0.1:9000".parse().unwrap());
///
///     while let Ok(event) = events.recv_async().await {
///         if let SocketEvent::Connected(_) = event {
///             client.send_text("hello", &CancellationToken::new()).await.unwrap();
///         }
///     }
/// }
/// ```
#[derive(Clone)]
pub struct ClientSocket {
    inner: Arc<ClientInner>,
}

impl ClientSocket {
    /// Client with a private buffer pool on the current compio runtime.
    #[must_use]
    pub fn new(options: SocketOptions) -> Self {
        Self::with_executor(options, Arc::new(BufferPool::new()), Arc::new(CompioExecutor))
    }

    /// Client sharing `pool` and scheduling background work on `executor`.
    #[must_use]
    pub fn with_executor(
        options: SocketOptions,
        pool: Arc<BufferPool>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        if options.heartbeat_shares_raw_stream() {
            warn!("heartbeat pings will be mixed into the raw byte stream");
        }
        let reconnect = ReconnectState::new(&options);
        Self {
            inner: Arc::new(ClientInner {
                options: Arc::new(options),
                pool,
                executor,
                events: EventHub::default(),
                state: Mutex::new(ClientState {
                    status: Status::Disconnected,
                    endpoint: None,
                    socket: None,
                    generation: 0,
                    attempt_cancel: None,
                    reconnect,
                    monitor: None,
                    last_close: None,
                }),
            }),
        }
    }

    /// Register a new event subscriber.
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

    /// Target of the current or last connection cycle.
    #[must_use]
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.state.lock().endpoint.clone()
    }

    /// How the most recent connection ended.
    #[must_use]
    pub fn last_close(&self) -> Option<CloseResult> {
        self.inner.state.lock().last_close.clone()
    }

    /// Start connecting to `endpoint` in the background.
    ///
    /// No-op while connecting or connected. Progress is reported through
    /// events; failures are retried after `reconnect_delay`.
    pub fn connect(&self, endpoint: Endpoint) {
        let generation = {
            let mut state = self.inner.state.lock();
            if state.status != Status::Disconnected {
                debug!(status = %state.status, "connect ignored");
                return;
            }
            state.status = Status::Connecting;
            state.endpoint = Some(endpoint);
            state.generation += 1;
            state.reconnect.reset();
            state.generation
        };
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .executor
            .spawn(Box::pin(ClientInner::run_attempt(weak, generation)));
    }

    /// Stop the connection and any reconnection.
    ///
    /// Fires `Disconnected(ClosedLocal)` once; later calls are no-ops.
    pub async fn disconnect(&self) {
        let socket = {
            let mut state = self.inner.state.lock();
            if state.status == Status::Disconnected {
                return;
            }
            state.status = Status::Disconnected;
            state.generation += 1;
            if let Some(cancel) = state.attempt_cancel.take() {
                cancel.cancel();
            }
            if let Some(monitor) = state.monitor.take() {
                monitor.stop();
            }
            let close = CloseResult::local();
            state.last_close = Some(close.clone());
            self.inner.events.emit(SocketEvent::Disconnected(close));
            debug!("client disconnected");
            state.socket.take()
        };
        if let Some(socket) = socket {
            socket.disconnect().await;
        }
    }

    /// Send a text message on the current connection.
    pub async fn send_text(&self, text: &str, cancel: &CancellationToken) -> Result<SendStatus> {
        self.send(Bytes::copy_from_slice(text.as_bytes()), MessageKind::Text, cancel)
            .await
    }

    /// Send a binary message on the current connection.
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
        let socket = self.inner.state.lock().socket.clone();
        match socket {
            Some(socket) => socket.send(payload, kind, cancel).await,
            None => Ok(SendStatus::Closed),
        }
    }

    /// Connect and wait until connected.
    ///
    /// Fails with [`TetherError::Canceled`] if `cancel` fires first and with
    /// [`TetherError::Disconnected`] if the client is disconnected meanwhile.
    pub async fn connect_and_wait(&self, endpoint: Endpoint, cancel: &CancellationToken) -> Result<()> {
        let events = self.subscribe();
        self.connect(endpoint);
        crate::ext::wait_connected(self, &events, cancel).await
    }
}

impl ClientInner {
    async fn run_attempt(weak: Weak<Self>, generation: u64) {
        let (socket, endpoint, cancel) = {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            if state.status != Status::Connecting || state.generation != generation {
                return;
            }
            let Some(endpoint) = state.endpoint.clone() else {
                return;
            };
            let cancel = CancellationToken::new();
            state.attempt_cancel = Some(cancel.clone());
            let socket = ManagedSocket::client(
                inner.options.clone(),
                inner.pool.clone(),
                inner.executor.clone(),
            );
            (socket, endpoint, cancel)
        };

        let result = socket.connect(&endpoint, &cancel).await;

        match weak.upgrade() {
            Some(inner) => inner.on_attempt_done(generation, endpoint, socket, result),
            None => socket.close_now(),
        }
    }

    fn on_attempt_done(
        self: &Arc<Self>,
        generation: u64,
        endpoint: Endpoint,
        socket: ManagedSocket,
        result: Result<()>,
    ) {
        let mut state = self.state.lock();
        if state.generation != generation || state.status != Status::Connecting {
            drop(state);
            debug!(generation, "discarding stale connect attempt");
            socket.close_now();
            return;
        }
        state.attempt_cancel = None;

        if let Err(err) = result {
            let err = Arc::new(err);
            debug!(%endpoint, error = %err, attempt = state.reconnect.attempt(), "connect attempt failed");
            self.events.emit(SocketEvent::Error(err.clone()));
            let close = CloseResult::failed(err);
            state.last_close = Some(close.clone());
            self.events.emit(SocketEvent::Disconnected(close));
            self.schedule_reconnect(&mut state);
            return;
        }

        state.status = Status::Connected;
        state.reconnect.reset();
        let monitor = self.options.monitor.create(&self.options);
        socket.set_handler(Arc::new(self.inbound_handler(generation, monitor.clone())));

        if let Some(closed) = socket.closed() {
            let weak = Arc::downgrade(self);
            self.executor.spawn(Box::pin(async move {
                let result = closed.await;
                if let Some(inner) = weak.upgrade() {
                    inner.on_closed(generation, result);
                }
            }));
        }

        let pinger_socket = socket.clone();
        let weak = Arc::downgrade(self);
        monitor.start(
            &self.executor,
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
                    inner.on_lost(generation);
                }
            },
        );

        state.monitor = Some(monitor);
        state.socket = Some(socket.clone());
        debug!(%endpoint, generation, "client connected");
        self.events.emit(SocketEvent::Connected(endpoint));

        if let Err(err) = socket.listen() {
            warn!(error = %err, "listen failed on a fresh connection");
            socket.close_now();
        }
    }

    fn inbound_handler(self: &Arc<Self>, generation: u64, monitor: ConnectionMonitor) -> impl Fn(Message) {
        let weak = Arc::downgrade(self);
        move |message| {
            if let Message::Binary(data) = &message {
                if monitor.observe(data) {
                    return;
                }
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let state = inner.state.lock();
            if state.generation != generation || state.status != Status::Connected {
                return;
            }
            inner.events.emit(match message {
                Message::Text(text) => SocketEvent::Text(text),
                Message::Binary(data) => SocketEvent::Binary(data),
            });
        }
    }

    fn on_lost(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation || state.status != Status::Connected {
            return;
        }
        debug!(generation, "heartbeat lost");
        self.restart(&mut state, CloseResult::remote());
    }

    fn on_closed(self: &Arc<Self>, generation: u64, result: CloseResult) {
        let mut state = self.state.lock();
        if state.generation != generation || state.status != Status::Connected {
            return;
        }
        debug!(generation, %result, "connection closed");
        self.restart(&mut state, result);
    }

    /// End the current connection cycle and schedule the next one.
    fn restart(self: &Arc<Self>, state: &mut ClientState, result: CloseResult) {
        state.status = Status::Connecting;
        state.generation += 1;
        if let Some(monitor) = state.monitor.take() {
            monitor.stop();
        }
        if let Some(socket) = state.socket.take() {
            socket.close_now();
        }
        if let Some(err) = result.error() {
            self.events.emit(SocketEvent::Error(err.clone()));
        }
        state.last_close = Some(result.clone());
        self.events.emit(SocketEvent::Disconnected(result));
        self.schedule_reconnect(state);
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ClientState) {
        if state.reconnect.exhausted() {
            let attempts = state.reconnect.attempt();
            warn!(attempts, "giving up reconnecting");
            state.status = Status::Disconnected;
            state.generation += 1;
            self.events
                .emit(SocketEvent::Error(Arc::new(TetherError::ReconnectExhausted { attempts })));
            return;
        }

        let delay = state.reconnect.next_delay();
        let generation = state.generation;
        debug!(?delay, attempt = state.reconnect.attempt(), "reconnect scheduled");
        let weak = Arc::downgrade(self);
        self.executor
            .schedule(delay, Box::pin(Self::run_attempt(weak, generation)));
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(cancel) = state.attempt_cancel.take() {
            cancel.cancel();
        }
        if let Some(monitor) = state.monitor.take() {
            monitor.stop();
        }
        if let Some(socket) = state.socket.take() {
            socket.close_now();
        }
    }
}

impl fmt::Debug for ClientSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ClientSocket")
            .field("status", &state.status)
            .field("endpoint", &state.endpoint)
            .field("generation", &state.generation)
            .finish()
    }
}
