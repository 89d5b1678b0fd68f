//! # Tether
//!
//! Reconnecting, heartbeat-monitored managed sockets built on `compio`.
//!
//! ## Architecture
//!
//! Tether is layered like a small messaging kernel:
//!
//! - **`tether-core`**: buffer pool, statuses, options, endpoints, heartbeat
//!   monitor, reconnect backoff, executor and cancellation helpers
//! - **`tether-wire`**: frame codec, managed socket, client/server façades
//! - **`tether`**: public API surface (this crate)
//!
//! ## Quick Start
//!
//! ### Client
//!
//! ```rust,no_run
//! use tether::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientSocket::new(SocketOptions::default());
//! let events = client.subscribe();
//! client.connect_and_wait(Endpoint::parse("tcp://127.0.0.1:9000")?, &CancellationToken::new()).await?;
//!
//! client.send_text("hello", &CancellationToken::new()).await?;
//! while let Ok(event) = events.recv_async().await {
//!     match event {
//!         SocketEvent::Text(text) => println!("got {text}"),
//!         SocketEvent::Disconnected(result) => println!("{result}"),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Server
//!
//! ```rust,no_run
//! use compio::net::TcpListener;
//! use tether::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = TcpListener::bind("127.0.0.1:9000").await?;
//! loop {
//!     let (stream, _) = listener.accept().await?;
//!     let (socket, events) = ServerSocket::from_tcp(stream, SocketOptions::default())?;
//!     compio::runtime::spawn(async move {
//!         let cancel = CancellationToken::new();
//!         while let Ok(event) = events.recv_async().await {
//!             if let SocketEvent::Text(text) = event {
//!                 let _ = socket.send_text(&text, &cancel).await;
//!             }
//!         }
//!     })
//!     .detach();
//! }
//! # }
//! ```
//!
//! ## Behavior
//!
//! - **Reconnect**: clients retry after `reconnect_delay`, optionally with
//!   exponential backoff and an attempt cap
//! - **Heartbeat**: a one-byte ping every `ping_interval`; silence longer than
//!   `max_ping_delay` counts as a lost connection
//! - **Events**: every subscriber sees `Connected`, messages, `Disconnected`
//!   in order for each connection
//! - **Cancellation**: sends and waits take a `CancellationToken`

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Development logging helpers.
pub mod dev_tracing;

// Re-export core types
pub use bytes::Bytes;

pub use tether_core::alloc::BufferPool;
pub use tether_core::buffer::{BufferError, ManagedBuffer};
pub use tether_core::cancel::CancellationToken;
pub use tether_core::config::BufferConfig;
pub use tether_core::endpoint::{Endpoint, EndpointError};
pub use tether_core::error::{Result, TetherError};
pub use tether_core::executor::{CompioExecutor, Executor};
pub use tether_core::monitor::{ConnectionMonitor, MonitorFactory, PING_FRAME};
pub use tether_core::options::{SocketOptions, TransportMode};
pub use tether_core::status::{CloseResult, CloseStatus, MessageKind, SendStatus, Status};

pub use tether_wire::{
    when_connected, when_disconnected, ClientSocket, EventStream, InboundHandler, Lifecycle,
    ManagedSocket, Message, Role, ServerSocket, SocketEvent,
};

/// Wire format encoding and decoding.
pub mod codec {
    pub use tether_wire::codec::*;
}

/// Convenient imports.
///
/// ```rust
/// use tether::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        when_connected, when_disconnected, BufferConfig, Bytes, CancellationToken, ClientSocket,
        CloseResult, CloseStatus, Endpoint, EventStream, SendStatus, ServerSocket, SocketEvent,
        SocketOptions, Status, TetherError, TransportMode,
    };
}
