//! Shared helpers for the socket integration tests.

#![allow(dead_code)]

use compio::net::{TcpListener, TcpStream};
use std::net::SocketAddr;
use std::time::Duration;
use tether_core::cancel::CancellationToken;
use tether_core::options::SocketOptions;
use tether_wire::{EventStream, ServerSocket, SocketEvent};

/// How long a test waits for an expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

/// Enable logging for a test run when `RUST_LOG` is set.
pub fn init_tracing() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Wait for the next event matching `pred`, skipping the others.
pub async fn next_matching(
    events: &EventStream,
    mut pred: impl FnMut(&SocketEvent) -> bool,
) -> SocketEvent {
    let wait = async {
        loop {
            let event = events.recv_async().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    };
    compio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .expect("timed out waiting for event")
}

/// Everything already queued on `events`.
pub fn drain(events: &EventStream) -> Vec<SocketEvent> {
    events.try_iter().collect()
}

/// Listener on an ephemeral loopback port.
pub async fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Address nobody listens on.
pub async fn refused_addr() -> SocketAddr {
    let (listener, addr) = listener().await;
    drop(listener);
    addr
}

/// Accept connections forever, echoing every message back.
///
/// Each accepted [`ServerSocket`] is forwarded on the returned channel.
pub fn spawn_echo_server(listener: TcpListener, options: SocketOptions) -> flume::Receiver<ServerSocket> {
    let (tx, rx) = flume::unbounded();
    compio::runtime::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok((socket, events)) = ServerSocket::from_tcp(stream, options.clone()) else {
                continue;
            };
            let _ = tx.send(socket.clone());
            compio::runtime::spawn(echo(socket, events)).detach();
        }
    })
    .detach();
    rx
}

async fn echo(socket: ServerSocket, events: EventStream) {
    let cancel = CancellationToken::new();
    while let Ok(event) = events.recv_async().await {
        match event {
            SocketEvent::Text(text) => {
                let _ = socket.send_text(&text, &cancel).await;
            }
            SocketEvent::Binary(data) => {
                let _ = socket.send_binary(data, &cancel).await;
            }
            SocketEvent::Disconnected(_) => break,
            _ => {}
        }
    }
}

/// Accept connections and hold them open without ever writing.
pub fn spawn_silent_server(listener: TcpListener) {
    compio::runtime::spawn(async move {
        let mut held: Vec<TcpStream> = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    })
    .detach();
}
