//! Tether Core
//!
//! This crate contains the transport-agnostic building blocks:
//! - Pooled receive buffers (`alloc`, `buffer`)
//! - Send / close status vocabulary (`status`)
//! - Heartbeat connection monitoring (`monitor`)
//! - Reconnection backoff (`reconnect`) and deferred execution (`executor`)
//! - Socket options, buffer sizing and endpoints (`options`, `config`, `endpoint`)
//! - Cancellation helpers and the poison guard (`cancel`, `poison`)
//! - TCP tuning and I/O timeouts (`tcp`, `timeout`)
//! - Error types (`error`)

// The alloc and tcp modules need unsafe for IoBuf impls and raw fd access
#![cfg_attr(not(test), deny(unsafe_code))]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
pub mod alloc;
pub mod buffer;
pub mod cancel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod options;
pub mod poison;
pub mod reconnect;
pub mod status;
pub mod tcp;
pub mod timeout;

// A small prelude to make downstream crates ergonomic.
// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::alloc::{BufferPool, IoBytes};
    pub use crate::buffer::ManagedBuffer;
    pub use crate::cancel::CancellationToken;
    pub use crate::config::BufferConfig;
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{Result, TetherError};
    pub use crate::executor::{CompioExecutor, Executor};
    pub use crate::monitor::{ConnectionMonitor, MonitorFactory, PING_FRAME};
    pub use crate::options::{SocketOptions, TransportMode};
    pub use crate::reconnect::ReconnectState;
    pub use crate::status::{CloseResult, CloseStatus, MessageKind, SendStatus, Status};
}
