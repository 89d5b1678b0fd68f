//! Status vocabulary shared by managed sockets and façades.

use crate::error::TetherError;
use std::fmt;
use std::sync::Arc;

/// Connection status of a façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
        }
    }
}

/// Outcome of a send call.
///
/// Expected failure modes are reported here instead of as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendStatus {
    /// Payload handed to the transport.
    Ok,
    /// The cancellation token fired before or during the write.
    Canceled,
    /// The connection is not open.
    Closed,
}

impl SendStatus {
    #[inline]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Canceled => f.write_str("canceled"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseStatus {
    /// Closed by this side.
    ClosedLocal,
    /// Closed by the peer (close frame or EOF).
    ClosedRemote,
    /// Transport or protocol failure.
    Error,
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClosedLocal => f.write_str("closed locally"),
            Self::ClosedRemote => f.write_str("closed by peer"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Terminal status of one connection, with the captured error if any.
///
/// Produced exactly once per connection termination.
#[derive(Debug, Clone)]
pub struct CloseResult {
    status: CloseStatus,
    error: Option<Arc<TetherError>>,
}

impl CloseResult {
    #[must_use]
    pub const fn local() -> Self {
        Self {
            status: CloseStatus::ClosedLocal,
            error: None,
        }
    }

    #[must_use]
    pub const fn remote() -> Self {
        Self {
            status: CloseStatus::ClosedRemote,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<Arc<TetherError>>) -> Self {
        Self {
            status: CloseStatus::Error,
            error: Some(error.into()),
        }
    }

    #[inline]
    #[must_use]
    pub const fn status(&self) -> CloseStatus {
        self.status
    }

    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&Arc<TetherError>> {
        self.error.as_ref()
    }
}

impl fmt::Display for CloseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(e) => write!(f, "{}: {e}", self.status),
            None => write!(f, "{}", self.status),
        }
    }
}

/// Kind of an application message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Binary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_result_display() {
        assert_eq!(CloseResult::local().to_string(), "closed locally");
        let result = CloseResult::failed(TetherError::Canceled);
        assert_eq!(result.status(), CloseStatus::Error);
        assert_eq!(result.to_string(), "error: operation canceled");
    }

    #[test]
    fn test_default_status() {
        assert_eq!(Status::default(), Status::Disconnected);
    }
}
