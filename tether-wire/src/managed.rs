//! Managed socket: one connection, created once per attempt and never reused.
//!
//! A [`ManagedSocket`] owns the transport stream and runs the receive loop.
//! Reads and writes go through a shared `Arc<TcpStream>` so the loop and any
//! number of senders can work concurrently; sends are serialized by an async
//! write lock so frames never interleave on the wire.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──connect──> Connecting ──ok──> Open ──close frame──> CloseReceived
//!                        │               │                         │
//!                        └──fail─────────┴───────────────> Closed <┘
//! ```
//!
//! Server sockets start in `Open` and listen immediately.

use bytes::Bytes;
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use compio::net::TcpStream;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_core::alloc::{BufferPool, IoBytes};
use tether_core::buffer::ManagedBuffer;
use tether_core::cancel::{or_cancel, CancellationToken};
use tether_core::endpoint::Endpoint;
use tether_core::error::{is_closed_kind, Result, TetherError};
use tether_core::executor::Executor;
use tether_core::options::{SocketOptions, TransportMode};
use tether_core::poison::PoisonGuard;
use tether_core::status::{CloseResult, CloseStatus, MessageKind, SendStatus};
use tether_core::tcp::configure_stream;
use tether_core::timeout::with_timeout;
use tracing::{debug, trace, warn};

use crate::codec::{self, Decoded, Decoder, WireError};

/// Which end of the connection this socket is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// A complete inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

/// Receives complete inbound messages.
///
/// Runs inline on the receive task: it must not block.
pub trait InboundHandler {
    fn on_message(&self, message: Message);
}

impl<F: Fn(Message)> InboundHandler for F {
    fn on_message(&self, message: Message) {
        self(message);
    }
}

enum Link {
    Idle,
    Connecting,
    Open(Arc<TcpStream>),
    CloseReceived(Arc<TcpStream>),
    Closed,
}

impl Link {
    fn stream(&self) -> Option<Arc<TcpStream>> {
        match self {
            Self::Open(stream) | Self::CloseReceived(stream) => Some(stream.clone()),
            _ => None,
        }
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open(_) => "open",
            Self::CloseReceived(_) => "close-received",
            Self::Closed => "closed",
        }
    }
}

/// What ended one `read_message` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Incoming {
    /// A full message of this kind is in the buffer.
    Message(MessageKind),
    /// The peer sent a close frame.
    Close,
    /// The stream ended between messages.
    Eof,
}

/// Source of transport bytes for the receive loop.
pub(crate) trait ChunkSource {
    /// Read one chunk into `decoder`; `Ok(0)` at end of stream.
    async fn fill(&mut self, decoder: &mut Decoder) -> io::Result<usize>;
}

struct StreamSource {
    stream: Arc<TcpStream>,
    chunk: Vec<u8>,
    chunk_size: usize,
}

impl StreamSource {
    fn new(stream: Arc<TcpStream>, chunk_size: usize) -> Self {
        Self {
            stream,
            chunk: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }
}

impl ChunkSource for StreamSource {
    async fn fill(&mut self, decoder: &mut Decoder) -> io::Result<usize> {
        let mut chunk = std::mem::take(&mut self.chunk);
        chunk.clear();
        // a cancelled read dropped the previous allocation
        if chunk.capacity() == 0 {
            chunk.reserve(self.chunk_size);
        }

        let mut reader = &*self.stream;
        let BufResult(result, chunk) = reader.read(chunk).await;
        let n = result?;
        decoder.feed(&chunk[..n]);
        self.chunk = chunk;
        Ok(n)
    }
}

/// Receive one message into `buffer`, growing it as needed.
pub(crate) async fn read_message<S: ChunkSource>(
    source: &mut S,
    decoder: &mut Decoder,
    buffer: &mut ManagedBuffer,
    max_message_size: Option<usize>,
) -> Result<Incoming> {
    buffer.reset()?;
    loop {
        match decoder.decode_into(buffer.free_space()?)? {
            Some(Decoded::Chunk {
                count,
                kind,
                end_of_message,
            }) => {
                buffer.track_data_size(count)?;
                if let Some(max) = max_message_size {
                    if buffer.len() > max {
                        return Err(TetherError::MessageTooLarge {
                            size: buffer.len(),
                            max,
                        });
                    }
                }
                if end_of_message {
                    return Ok(Incoming::Message(kind));
                }
                if buffer.free_len() == 0 {
                    buffer.grow()?;
                    trace!(capacity = buffer.capacity(), "receive buffer grown");
                }
            }
            Some(Decoded::Close) => return Ok(Incoming::Close),
            None => {
                let n = source.fill(decoder).await?;
                if n == 0 {
                    if decoder.is_mid_message() || !buffer.is_empty() {
                        return Err(WireError::UnexpectedEof.into());
                    }
                    return Ok(Incoming::Eof);
                }
                trace!(bytes = n, "received chunk");
            }
        }
    }
}

struct Shared {
    role: Role,
    options: Arc<SocketOptions>,
    pool: Arc<BufferPool>,
    executor: Arc<dyn Executor>,
    link: Mutex<Link>,
    peer: Mutex<Option<SocketAddr>>,
    listening: AtomicBool,
    closing: AtomicBool,
    finished: AtomicBool,
    close_sent: AtomicBool,
    poisoned: AtomicBool,
    write_lock: async_lock::Mutex<()>,
    close_token: CancellationToken,
    abort_reason: Mutex<Option<TetherError>>,
    handler: Mutex<Option<Arc<dyn InboundHandler>>>,
    close_tx: flume::Sender<CloseResult>,
    close_rx: Mutex<Option<flume::Receiver<CloseResult>>>,
}

/// One managed connection, client or server side.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct ManagedSocket {
    shared: Arc<Shared>,
}

impl ManagedSocket {
    fn with_link(
        role: Role,
        link: Link,
        options: Arc<SocketOptions>,
        pool: Arc<BufferPool>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let (close_tx, close_rx) = flume::bounded(1);
        Self {
            shared: Arc::new(Shared {
                role,
                options,
                pool,
                executor,
                link: Mutex::new(link),
                peer: Mutex::new(None),
                listening: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                close_sent: AtomicBool::new(false),
                poisoned: AtomicBool::new(false),
                write_lock: async_lock::Mutex::new(()),
                close_token: CancellationToken::new(),
                abort_reason: Mutex::new(None),
                handler: Mutex::new(None),
                close_tx,
                close_rx: Mutex::new(Some(close_rx)),
            }),
        }
    }

    /// New unconnected client socket.
    #[must_use]
    pub fn client(
        options: Arc<SocketOptions>,
        pool: Arc<BufferPool>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self::with_link(Role::Client, Link::Idle, options, pool, executor)
    }

    /// Wrap an accepted stream and start listening.
    ///
    /// `handler` is installed before the first read so no message is missed.
    pub fn server(
        stream: TcpStream,
        options: Arc<SocketOptions>,
        pool: Arc<BufferPool>,
        executor: Arc<dyn Executor>,
        handler: Option<Arc<dyn InboundHandler>>,
    ) -> Result<Self> {
        configure_stream(&stream, &options)?;
        let peer = stream.peer_addr().ok();
        let socket = Self::with_link(
            Role::Server,
            Link::Open(Arc::new(stream)),
            options,
            pool,
            executor,
        );
        *socket.shared.peer.lock() = peer;
        *socket.shared.handler.lock() = handler;
        socket.listen()?;
        Ok(socket)
    }

    #[inline]
    #[must_use]
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Remote address once connected.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *self.shared.peer.lock()
    }

    /// Returns true while frames can still be sent.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.link.lock().stream().is_some()
            && !self.shared.poisoned.load(Ordering::Acquire)
            && !self.shared.closing.load(Ordering::Acquire)
    }

    /// Returns true once the connection reached its terminal state.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(*self.shared.link.lock(), Link::Closed)
    }

    /// Replace the inbound message handler.
    pub fn set_handler(&self, handler: Arc<dyn InboundHandler>) {
        *self.shared.handler.lock() = Some(handler);
    }

    /// Unsubscribe the inbound message handler.
    pub fn clear_handler(&self) {
        self.shared.handler.lock().take();
    }

    /// Connect to `endpoint`, honoring `connect_timeout`.
    ///
    /// Refused connections, timeouts and cancellation come back as `Err` and
    /// leave the socket closed. Calling this on a server socket, twice, or
    /// after close is an [`TetherError::InvalidState`].
    pub async fn connect(&self, endpoint: &Endpoint, cancel: &CancellationToken) -> Result<()> {
        if self.shared.role == Role::Server {
            return Err(TetherError::InvalidState("connect on a server socket"));
        }
        {
            let mut link = self.shared.link.lock();
            if !matches!(*link, Link::Idle) || self.shared.closing.load(Ordering::Acquire) {
                return Err(TetherError::InvalidState("socket already connected or closed"));
            }
            *link = Link::Connecting;
        }
        debug!(%endpoint, "connecting");

        let opened = or_cancel(self.open(endpoint, cancel), &self.shared.close_token)
            .await
            .unwrap_or(Err(TetherError::Canceled));

        let mut link = self.shared.link.lock();
        match opened {
            Ok(stream) if matches!(*link, Link::Connecting) => {
                *self.shared.peer.lock() = stream.peer_addr().ok();
                *link = Link::Open(Arc::new(stream));
                debug!(%endpoint, "connected");
                Ok(())
            }
            Ok(_) => {
                *link = Link::Closed;
                Err(TetherError::Canceled)
            }
            Err(err) => {
                *link = Link::Closed;
                debug!(%endpoint, error = %err, "connect failed");
                Err(err)
            }
        }
    }

    async fn open(&self, endpoint: &Endpoint, cancel: &CancellationToken) -> Result<TcpStream> {
        // name resolution shares the connect deadline and the cancel token
        let dial = async {
            let addr = endpoint.resolve().await?;
            trace!(%endpoint, %addr, "resolved");
            Ok::<_, TetherError>(TcpStream::connect(addr).await?)
        };
        let timeout = self.shared.options.connect_timeout;
        let stream = match or_cancel(with_timeout(timeout, dial), cancel).await {
            None => return Err(TetherError::Canceled),
            Some(Err(e)) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(TetherError::ConnectTimeout(timeout))
            }
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Err(e))) => return Err(e),
            Some(Ok(Ok(stream))) => stream,
        };
        configure_stream(&stream, &self.shared.options)?;
        Ok(stream)
    }

    /// Start the receive loop.
    ///
    /// Fails with [`TetherError::InvalidState`] if the socket is not open or
    /// already listening.
    pub fn listen(&self) -> Result<()> {
        let stream = self
            .shared
            .link
            .lock()
            .stream()
            .ok_or(TetherError::InvalidState("listen on a socket that is not open"))?;
        if self.shared.listening.swap(true, Ordering::AcqRel) {
            return Err(TetherError::InvalidState("socket already listening"));
        }

        let this = self.clone();
        self.shared.executor.spawn(Box::pin(async move {
            let result = this.receive_loop(stream).await;
            this.finish(result);
        }));
        Ok(())
    }

    async fn receive_loop(&self, stream: Arc<TcpStream>) -> CloseResult {
        let options = &self.shared.options;
        let mut buffer = ManagedBuffer::new(self.shared.pool.clone(), options.buffers.receive_buf_size);
        let mut decoder = Decoder::new(options.mode, options.max_message_size);
        let mut source = StreamSource::new(stream, options.buffers.read_chunk_size);

        let result = loop {
            let step = or_cancel(
                read_message(&mut source, &mut decoder, &mut buffer, options.max_message_size),
                &self.shared.close_token,
            )
            .await;

            match step {
                None => break self.local_result(),
                Some(Ok(Incoming::Message(kind))) => {
                    let dispatched = buffer
                        .data()
                        .map_err(TetherError::from)
                        .and_then(|data| self.dispatch(kind, data));
                    if let Err(err) = dispatched {
                        break CloseResult::failed(err);
                    }
                }
                Some(Ok(Incoming::Close)) => {
                    self.on_close_received().await;
                    break CloseResult::remote();
                }
                Some(Ok(Incoming::Eof)) => break CloseResult::remote(),
                Some(Err(err)) => break CloseResult::failed(err),
            }
        };

        if let Err(err) = buffer.dispose() {
            warn!(error = %err, "receive buffer already released");
        }

        // the peer answering our own close is still a local close
        if self.shared.closing.load(Ordering::Acquire) && result.status() == CloseStatus::ClosedRemote {
            return CloseResult::local();
        }
        result
    }

    fn dispatch(&self, kind: MessageKind, data: &[u8]) -> Result<()> {
        let message = match kind {
            MessageKind::Text => Message::Text(
                std::str::from_utf8(data)
                    .map_err(|e| TetherError::protocol(format!("invalid UTF-8 in text message: {e}")))?
                    .to_owned(),
            ),
            MessageKind::Binary => Message::Binary(Bytes::copy_from_slice(data)),
        };
        trace!(?kind, len = data.len(), "message received");

        let handler = self.shared.handler.lock().clone();
        if let Some(handler) = handler {
            handler.on_message(message);
        }
        Ok(())
    }

    async fn on_close_received(&self) {
        let stream = {
            let mut link = self.shared.link.lock();
            let Some(stream) = link.stream() else {
                return;
            };
            *link = Link::CloseReceived(stream.clone());
            stream
        };
        debug!("close frame received");
        if let Err(err) = self.graceful_close(&stream).await {
            debug!(error = %err, "close reply failed");
        }
    }

    /// Close frame (framed mode, once) and write shutdown, bounded by `close_timeout`.
    async fn graceful_close(&self, stream: &TcpStream) -> io::Result<()> {
        if self.shared.poisoned.load(Ordering::Acquire) {
            return Ok(());
        }
        let mode = self.shared.options.mode;
        let close = async {
            let _write = self.shared.write_lock.lock().await;
            let mut writer = stream;
            if mode == TransportMode::Framed && !self.shared.close_sent.swap(true, Ordering::AcqRel) {
                let BufResult(result, _) = writer.write_all(IoBytes::new(codec::encode_close())).await;
                result?;
            }
            writer.shutdown().await
        };
        with_timeout(self.shared.options.close_timeout, close).await?
    }

    fn local_result(&self) -> CloseResult {
        match self.shared.abort_reason.lock().take() {
            Some(reason) => CloseResult::failed(reason),
            None => CloseResult::local(),
        }
    }

    fn finish(&self, result: CloseResult) {
        if self.shared.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        let previous = std::mem::replace(&mut *self.shared.link.lock(), Link::Closed);
        self.shared.close_token.cancel();
        debug!(role = ?self.shared.role, from = previous.name(), %result, "connection finished");
        let _ = self.shared.close_tx.try_send(result);
    }

    /// Tear the connection down with an error close result.
    fn abort(&self, reason: TetherError) {
        {
            let mut slot = self.shared.abort_reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.shared.close_token.cancel();
        if !self.shared.listening.load(Ordering::Acquire) {
            let result = self.local_result();
            self.finish(result);
        }
    }

    /// Send one message.
    ///
    /// Returns [`SendStatus::Canceled`] if `cancel` fired before or during the
    /// write and [`SendStatus::Closed`] if the connection is gone. Other I/O
    /// errors are returned as `Err`.
    pub async fn send(&self, payload: Bytes, kind: MessageKind, cancel: &CancellationToken) -> Result<SendStatus> {
        if cancel.is_cancelled() {
            return Ok(SendStatus::Canceled);
        }
        let Some(stream) = self.shared.link.lock().stream() else {
            return Ok(SendStatus::Closed);
        };
        if !self.writable() {
            return Ok(SendStatus::Closed);
        }

        let options = &self.shared.options;
        let frame = codec::encode(options.mode, kind, payload, options.max_frame_payload);

        let Some(_write) = or_cancel(self.shared.write_lock.lock(), cancel).await else {
            return Ok(SendStatus::Canceled);
        };
        if !self.writable() {
            return Ok(SendStatus::Closed);
        }

        let len = frame.len();
        let write = async {
            let guard = PoisonGuard::new(&self.shared.poisoned);
            let mut writer = &*stream;
            let BufResult(result, _) = writer.write_all(IoBytes::new(frame)).await;
            if result.is_ok() {
                guard.disarm();
            }
            result
        };

        match or_cancel(write, cancel).await {
            Some(Ok(())) => {
                trace!(?kind, bytes = len, "frame sent");
                Ok(SendStatus::Ok)
            }
            Some(Err(e)) if is_closed_kind(e.kind()) => {
                debug!(error = %e, "send on a closed connection");
                Ok(SendStatus::Closed)
            }
            Some(Err(e)) => Err(e.into()),
            None => {
                warn!("send cancelled mid-write, connection poisoned");
                self.abort(TetherError::Poisoned);
                Ok(SendStatus::Canceled)
            }
        }
    }

    fn writable(&self) -> bool {
        !self.shared.poisoned.load(Ordering::Acquire)
            && !self.shared.close_sent.load(Ordering::Acquire)
            && !self.shared.closing.load(Ordering::Acquire)
    }

    /// Graceful, idempotent disconnect.
    ///
    /// Unsubscribes the handler, sends a close frame and shuts down writing
    /// (best-effort, bounded by `close_timeout`), then stops the receive loop.
    /// The close result is [`CloseStatus::ClosedLocal`]
    /// unless the connection already ended.
    pub async fn disconnect(&self) {
        self.clear_handler();
        if self.shared.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        let stream = self.shared.link.lock().stream();
        if let Some(stream) = stream {
            match self.graceful_close(&stream).await {
                Ok(()) => debug!("graceful close complete"),
                Err(err) => debug!(error = %err, "graceful close failed"),
            }
        }
        self.stop();
    }

    /// Immediate, synchronous close without a close frame.
    pub fn close_now(&self) {
        self.clear_handler();
        self.shared.closing.store(true, Ordering::Release);
        self.stop();
    }

    fn stop(&self) {
        self.shared.close_token.cancel();
        if !self.shared.listening.load(Ordering::Acquire) {
            self.finish(CloseResult::local());
        }
    }

    /// Future resolving with the close result.
    ///
    /// Only the first call gets the future; later calls return `None`.
    pub fn closed(&self) -> Option<impl Future<Output = CloseResult> + 'static> {
        let rx = self.shared.close_rx.lock().take()?;
        Some(async move { rx.recv_async().await.unwrap_or_else(|_| CloseResult::local()) })
    }
}

impl fmt::Debug for ManagedSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedSocket")
            .field("role", &self.shared.role)
            .field("link", &self.shared.link.lock().name())
            .field("peer", &self.peer_addr())
            .field("poisoned", &self.shared.poisoned.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tether_core::options::TransportMode;

    /// Replays scripted reads.
    struct ScriptedSource {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ScriptedSource {
        fn new(wire: &[u8], chunk: usize) -> Self {
            Self {
                chunks: wire.chunks(chunk).map(<[u8]>::to_vec).collect(),
            }
        }
    }

    impl ChunkSource for ScriptedSource {
        async fn fill(&mut self, decoder: &mut Decoder) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    decoder.feed(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    fn framed(kind: MessageKind, payload: &[u8], max_frame: Option<usize>) -> Bytes {
        codec::encode(TransportMode::Framed, kind, Bytes::copy_from_slice(payload), max_frame)
    }

    #[compio::test]
    async fn test_reassembly_grows_buffer() {
        let pool = Arc::new(BufferPool::new());
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let wire = framed(MessageKind::Binary, &payload, Some(700));

        let mut source = ScriptedSource::new(&wire, 333);
        let mut decoder = Decoder::new(TransportMode::Framed, None);
        let mut buffer = ManagedBuffer::new(pool.clone(), 16);
        let initial = buffer.capacity();

        let incoming = read_message(&mut source, &mut decoder, &mut buffer, None).await.unwrap();
        assert_eq!(incoming, Incoming::Message(MessageKind::Binary));
        assert_eq!(buffer.data().unwrap(), &payload[..]);

        let min_grows = (payload.len() as f64 / initial as f64).log2().ceil() as u32;
        assert!(buffer.grow_count() >= min_grows, "grew {} times", buffer.grow_count());

        buffer.dispose().unwrap();
        assert_eq!(pool.outstanding(), 0);
    }

    #[compio::test]
    async fn test_messages_in_one_read() {
        let pool = Arc::new(BufferPool::new());
        let mut wire = framed(MessageKind::Text, b"first", None).to_vec();
        wire.extend_from_slice(&framed(MessageKind::Binary, b"second", None));
        wire.extend_from_slice(&codec::encode_close());

        let mut source = ScriptedSource::new(&wire, wire.len());
        let mut decoder = Decoder::new(TransportMode::Framed, None);
        let mut buffer = ManagedBuffer::new(pool, 64);

        let first = read_message(&mut source, &mut decoder, &mut buffer, None).await.unwrap();
        assert_eq!(first, Incoming::Message(MessageKind::Text));
        assert_eq!(buffer.data().unwrap(), b"first");

        let second = read_message(&mut source, &mut decoder, &mut buffer, None).await.unwrap();
        assert_eq!(second, Incoming::Message(MessageKind::Binary));
        assert_eq!(buffer.data().unwrap(), b"second");

        let close = read_message(&mut source, &mut decoder, &mut buffer, None).await.unwrap();
        assert_eq!(close, Incoming::Close);
    }

    #[compio::test]
    async fn test_eof_between_and_within_messages() {
        let pool = Arc::new(BufferPool::new());

        let mut source = ScriptedSource::new(&[], 1);
        let mut decoder = Decoder::new(TransportMode::Framed, None);
        let mut buffer = ManagedBuffer::new(pool.clone(), 64);
        let result = read_message(&mut source, &mut decoder, &mut buffer, None).await.unwrap();
        assert_eq!(result, Incoming::Eof);

        let wire = framed(MessageKind::Binary, b"truncated", None);
        let mut source = ScriptedSource::new(&wire[..wire.len() - 3], 4);
        let mut decoder = Decoder::new(TransportMode::Framed, None);
        let err = read_message(&mut source, &mut decoder, &mut buffer, None).await.unwrap_err();
        assert!(matches!(err, TetherError::Protocol(_)));
    }

    #[compio::test]
    async fn test_message_size_limit() {
        let pool = Arc::new(BufferPool::new());
        let wire = framed(MessageKind::Binary, &[1u8; 300], Some(100));
        let mut source = ScriptedSource::new(&wire, 64);
        let mut decoder = Decoder::new(TransportMode::Framed, Some(256));
        let mut buffer = ManagedBuffer::new(pool, 64);

        let err = read_message(&mut source, &mut decoder, &mut buffer, Some(256))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::MessageTooLarge { max: 256, .. }));
    }

    #[compio::test]
    async fn test_raw_mode_read_is_message() {
        let pool = Arc::new(BufferPool::new());
        let mut source = ScriptedSource::new(b"hello raw", 5);
        let mut decoder = Decoder::new(TransportMode::Raw, None);
        let mut buffer = ManagedBuffer::new(pool, 64);

        let first = read_message(&mut source, &mut decoder, &mut buffer, None).await.unwrap();
        assert_eq!(first, Incoming::Message(MessageKind::Binary));
        assert_eq!(buffer.data().unwrap(), b"hello");
        read_message(&mut source, &mut decoder, &mut buffer, None).await.unwrap();
        assert_eq!(buffer.data().unwrap(), b" raw");
    }

    #[compio::test]
    async fn test_connect_on_server_is_invalid() {
        use compio::net::TcpListener;
        use tether_core::executor::CompioExecutor;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = futures::join!(TcpStream::connect(addr), listener.accept());
        let _client = client.unwrap();
        let (stream, _) = accepted.unwrap();

        let socket = ManagedSocket::server(
            stream,
            Arc::new(SocketOptions::default()),
            Arc::new(BufferPool::new()),
            Arc::new(CompioExecutor),
            None,
        )
        .unwrap();
        let err = socket
            .connect(&Endpoint::Tcp(addr), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::InvalidState(_)));
        assert!(matches!(socket.listen(), Err(TetherError::InvalidState(_))));
        socket.close_now();
    }

    #[compio::test]
    async fn test_listen_before_connect_is_invalid() {
        use tether_core::executor::CompioExecutor;

        let socket = ManagedSocket::client(
            Arc::new(SocketOptions::default()),
            Arc::new(BufferPool::new()),
            Arc::new(CompioExecutor),
        );
        assert!(matches!(socket.listen(), Err(TetherError::InvalidState(_))));

        socket.disconnect().await;
        assert!(socket.is_closed());
        let closed = socket.closed().unwrap().await;
        assert_eq!(closed.status(), CloseStatus::ClosedLocal);
        assert!(socket.closed().is_none());

        let err = socket
            .connect(&Endpoint::parse("127.0.0.1:1").unwrap(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::InvalidState(_)));
    }
}
