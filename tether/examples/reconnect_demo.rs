//! Client reconnection and heartbeat loss.
//!
//! The server accepts three connections: it drops the first right away,
//! goes silent on the second (the client heartbeat notices) and serves
//! the third normally.
//!
//! Run with:
//! ```bash
//! RUST_LOG=tether_wire=debug cargo run --example reconnect_demo
//! ```

use compio::net::TcpListener;
use std::time::Duration;
use tether::prelude::*;

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tether::dev_tracing::init_tracing();

    println!("=== Reconnect Demo ===\n");

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let options = SocketOptions::default()
        .with_reconnect_delay(Duration::from_millis(100))
        .with_reconnect_delay_max(Duration::from_secs(2))
        .with_ping_interval(Duration::from_millis(100))
        .with_max_ping_delay(Duration::from_millis(350));

    let server_options = options.clone();
    compio::runtime::spawn(async move {
        // 1: drop immediately
        if let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
        // 2: hold open, never answer pings
        let Ok((_silent, _)) = listener.accept().await else {
            return;
        };
        // 3: behave
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok((_socket, events)) = ServerSocket::from_tcp(stream, server_options) else {
            return;
        };
        while events.recv_async().await.is_ok() {}
    })
    .detach();

    let client = ClientSocket::new(options);
    let events = client.subscribe();
    client.connect(Endpoint::from(addr));

    let mut connects = 0;
    while connects < 3 {
        match compio::time::timeout(Duration::from_secs(5), events.recv_async()).await {
            Ok(Ok(event)) => {
                println!("  {event}  (status: {})", client.status());
                if matches!(event, SocketEvent::Connected(_)) {
                    connects += 1;
                }
            }
            _ => break,
        }
    }

    // the third connection stays up: pings flow both ways
    compio::time::sleep(Duration::from_millis(500)).await;
    println!("\n✓ Still connected: {}", client.is_connected());

    client.disconnect().await;
    let result = when_disconnected(&client, &CancellationToken::new()).await?;
    println!("✓ {result}");
    Ok(())
}
