//! Endpoint abstraction for client connect targets.
//!
//! Provides addressing for IP literals and host names with parsing support.

use compio::net::ToSocketAddrsAsync;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Connect target of a client socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// IP literal, no resolution needed
    Tcp(SocketAddr),
    /// Resolved on every connect attempt
    Host { host: String, port: u16 },
}

impl Endpoint {
    /// Accepts `ip:port`, `[v6]:port` and `host:port`, each with an optional
    /// `tcp://` prefix.
    ///
    /// ```
    /// use tether_core::endpoint::Endpoint;
    ///
    /// assert!(Endpoint::parse("tcp://10.0.0.7:9000").unwrap().is_literal());
    /// assert!(!Endpoint::parse("db.internal:9000").unwrap().is_literal());
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Returns true if no name resolution is needed.
    pub fn is_literal(&self) -> bool {
        matches!(self, Endpoint::Tcp(_))
    }

    /// Resolve to a socket address, taking the first resolved address.
    ///
    /// Host names go through the runtime's asynchronous resolver; literal
    /// addresses return immediately.
    pub async fn resolve(&self) -> Result<SocketAddr, EndpointError> {
        match self {
            Endpoint::Tcp(addr) => Ok(*addr),
            Endpoint::Host { host, port } => (host.as_str(), *port)
                .to_socket_addrs_async()
                .await?
                .next()
                .ok_or_else(|| EndpointError::Unresolved(host.clone())),
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr = match s.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some(_) => return Err(EndpointError::InvalidScheme(s.to_string())),
            None => s,
        };

        if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
            return Ok(Endpoint::Tcp(socket_addr));
        }

        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::InvalidTcpAddress(addr.to_string()))?;
        if host.is_empty() || host.contains(['[', ']', '/']) {
            return Err(EndpointError::InvalidTcpAddress(addr.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| EndpointError::InvalidPort(port.to_string()))?;

        Ok(Endpoint::Host {
            host: host.to_string(),
            port,
        })
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint::Tcp(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            Endpoint::Host { host, port } => write!(f, "tcp://{}:{}", host, port),
        }
    }
}

/// Errors that can occur when parsing or resolving endpoints.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid scheme in endpoint: {0} (expected tcp://)")]
    InvalidScheme(String),

    #[error("Invalid TCP address: {0}")]
    InvalidTcpAddress(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Host did not resolve to any address: {0}")]
    Unresolved(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_literals_with_and_without_scheme() {
        for (input, expected) in [
            ("tcp://10.1.2.3:9000", "10.1.2.3:9000"),
            ("10.1.2.3:9000", "10.1.2.3:9000"),
            ("tcp://[::1]:7000", "[::1]:7000"),
        ] {
            assert_eq!(Endpoint::parse(input).unwrap(), Endpoint::Tcp(addr(expected)));
        }
    }

    #[test]
    fn test_display_always_has_scheme() {
        assert_eq!(Endpoint::parse("10.1.2.3:9000").unwrap().to_string(), "tcp://10.1.2.3:9000");
        assert_eq!(Endpoint::parse("relay:81").unwrap().to_string(), "tcp://relay:81");
    }

    #[test]
    fn test_host_names() {
        let endpoint: Endpoint = "tcp://relay.example:8443".parse().unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Host {
                host: "relay.example".to_owned(),
                port: 8443
            }
        );
        assert!(!endpoint.is_literal());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(Endpoint::parse("ws://10.1.2.3:1"), Err(EndpointError::InvalidScheme(_))));
        assert!(matches!(Endpoint::parse("relay:http"), Err(EndpointError::InvalidPort(_))));
        assert!(matches!(Endpoint::parse("relay"), Err(EndpointError::InvalidTcpAddress(_))));
        assert!(matches!(Endpoint::parse(":80"), Err(EndpointError::InvalidTcpAddress(_))));
        assert!(matches!(Endpoint::parse("relay:70000"), Err(EndpointError::InvalidPort(_))));
    }

    #[compio::test]
    async fn test_resolution() {
        let literal = Endpoint::from(addr("10.1.2.3:1"));
        assert_eq!(literal.resolve().await.unwrap(), addr("10.1.2.3:1"));
        let local = Endpoint::parse("localhost:4000").unwrap().resolve().await.unwrap();
        assert_eq!(local.port(), 4000);
        assert!(local.ip().is_loopback());
    }
}
