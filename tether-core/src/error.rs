/// Tether Error Types
///
/// Error handling shared by every layer of the managed socket stack.
use crate::buffer::BufferError;
use crate::endpoint::EndpointError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for Tether operations
#[derive(Error, Debug)]
pub enum TetherError {
    /// IO error during socket operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Receive buffer misuse
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Endpoint could not be parsed or resolved
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// Operation not valid in the current state (programming error)
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// Connect did not complete in time
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// Cancellation token fired
    #[error("operation canceled")]
    Canceled,

    /// The socket was disconnected by the application
    #[error("Socket disconnected")]
    Disconnected,

    /// Peer violated the wire protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Message exceeded `max_message_size`
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A write was interrupted and the stream holds a partial frame
    #[error("Connection poisoned by cancelled write")]
    Poisoned,

    /// Reconnect attempt budget exhausted
    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// Result type alias for Tether operations
pub type Result<T> = std::result::Result<T, TetherError>;

impl TetherError {
    /// Create a protocol error with a message
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Check if this error is a transient transport failure.
    ///
    /// Transient failures are recovered locally (close result, reconnect);
    /// everything else points at a bug in the caller.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_)
            | Self::ConnectTimeout(_)
            | Self::Canceled
            | Self::Protocol(_)
            | Self::MessageTooLarge { .. }
            | Self::Poisoned => true,
            Self::Endpoint(EndpointError::Io(_)) => true,
            Self::Buffer(_)
            | Self::Endpoint(_)
            | Self::InvalidState(_)
            | Self::Disconnected
            | Self::ReconnectExhausted { .. } => false,
        }
    }

    /// Check if this IO error means the connection is gone.
    ///
    /// Sends map these to `SendStatus::Closed` instead of propagating them.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Io(e) => is_closed_kind(e.kind()),
            Self::Poisoned | Self::Disconnected => true,
            _ => false,
        }
    }
}

/// IO error kinds reported by a transport whose connection is already gone.
#[must_use]
pub fn is_closed_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors() {
        let err = TetherError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.is_connection_error());
        assert!(err.is_transient());

        let err = TetherError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_programming_errors_are_not_transient() {
        assert!(!TetherError::InvalidState("already connected").is_transient());
        assert!(!TetherError::from(BufferError::Disposed).is_transient());
    }
}
