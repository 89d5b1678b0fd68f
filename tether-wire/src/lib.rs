//! # Tether Wire
//!
//! Managed TCP sockets on top of `tether-core`.
//!
//! ## Overview
//!
//! - **`ManagedSocket`**: one connection, its receive loop and graceful close
//! - **`ClientSocket`**: connects, reconnects with backoff, monitors liveness
//! - **`ServerSocket`**: wraps one accepted connection
//! - **`when_connected` / `when_disconnected`**: await lifecycle transitions
//!
//! Messages travel either in a small length-prefixed frame format that keeps
//! message boundaries and text/binary kinds, or raw (one read, one message).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether_core::cancel::CancellationToken;
//! use tether_core::options::SocketOptions;
//! use tether_wire::{ClientSocket, SocketEvent};
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientSocket::new(SocketOptions::default());
//!     let events = client.subscribe();
//!     client.connect_and_wait("tcp://127.0.0.1:9000".parse()?, &CancellationToken::new()).await?;
//!
//!     client.send_text("hello", &CancellationToken::new()).await?;
//!     while let Ok(event) = events.recv_async().await {
//!         if let SocketEvent::Text(text) = event {
//!             println!("{text}");
//!             break;
//!         }
//!     }
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

// Allow some pedantic lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::let_underscore_future)]

pub mod codec;
mod event;
mod ext;
mod managed;

// Socket façades
mod client;
mod server;

pub use client::ClientSocket;
pub use event::{EventStream, SocketEvent};
pub use ext::{when_connected, when_disconnected, Lifecycle};
pub use managed::{InboundHandler, ManagedSocket, Message, Role};
pub use server::ServerSocket;

/// Prelude module for convenient imports
///
/// ```rust
/// use tether_wire::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        when_connected, when_disconnected, ClientSocket, EventStream, Lifecycle, ServerSocket,
        SocketEvent,
    };
    pub use bytes::Bytes;
}
