//! TCP stream tuning.
//!
//! # Safety
//!
//! Socket options are set through a borrowed raw descriptor wrapped in a
//! `ManuallyDrop<socket2::Socket>`, so the descriptor is never closed here.

#![allow(unsafe_code)]

use crate::options::SocketOptions;
use std::io;

/// Apply per-stream options to a freshly connected or accepted stream.
pub fn configure_stream(stream: &compio::net::TcpStream, options: &SocketOptions) -> io::Result<()> {
    set_nodelay(stream, options.nodelay)
}

/// Set TCP_NODELAY on a compio TcpStream.
///
/// # Errors
///
/// Returns an error if the socket option cannot be set.
pub fn set_nodelay(stream: &compio::net::TcpStream, nodelay: bool) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::mem::ManuallyDrop;
        use std::os::unix::io::{AsRawFd, FromRawFd};
        let fd = stream.as_raw_fd();
        let sock = ManuallyDrop::new(unsafe { socket2::Socket::from_raw_fd(fd) });
        sock.set_nodelay(nodelay)
    }

    #[cfg(windows)]
    {
        use std::mem::ManuallyDrop;
        use std::os::windows::io::{AsRawSocket, FromRawSocket};
        let raw = stream.as_raw_socket();
        let sock = ManuallyDrop::new(unsafe { socket2::Socket::from_raw_socket(raw) });
        sock.set_nodelay(nodelay)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (stream, nodelay);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compio::net::{TcpListener, TcpStream};

    #[compio::test]
    async fn test_configure_accepted_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) =
            futures::join!(TcpStream::connect(addr), listener.accept());
        let client = client.unwrap();
        let (server, _) = accepted.unwrap();

        configure_stream(&client, &SocketOptions::default()).unwrap();
        set_nodelay(&server, false).unwrap();
    }
}
