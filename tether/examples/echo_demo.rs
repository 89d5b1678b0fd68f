//! Echo server and client on one runtime.
//!
//! Shows how to:
//! - Wrap accepted streams in `ServerSocket`
//! - Connect a `ClientSocket` and wait until it is connected
//! - Exchange text and binary messages through the event streams
//!
//! Run with:
//! ```bash
//! RUST_LOG=debug cargo run --example echo_demo
//! ```

use compio::net::TcpListener;
use std::time::Duration;
use tether::prelude::*;

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tether::dev_tracing::init_tracing();

    println!("=== Echo Demo ===\n");

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    println!("✓ Listening on tcp://{addr}");

    compio::runtime::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok((socket, events)) = ServerSocket::from_tcp(stream, SocketOptions::default()) else {
                continue;
            };
            compio::runtime::spawn(async move {
                let cancel = CancellationToken::new();
                while let Ok(event) = events.recv_async().await {
                    match event {
                        SocketEvent::Text(text) => {
                            let _ = socket.send_text(&text.to_uppercase(), &cancel).await;
                        }
                        SocketEvent::Binary(data) => {
                            let _ = socket.send_binary(data, &cancel).await;
                        }
                        other => println!("  [server] {other}"),
                    }
                }
            })
            .detach();
        }
    })
    .detach();

    let client = ClientSocket::new(SocketOptions::default());
    let events = client.subscribe();
    client
        .connect_and_wait(Endpoint::from(addr), &CancellationToken::new())
        .await?;
    println!("✓ Client connected\n");

    let cancel = CancellationToken::new();
    for word in ["demo", "tether", "echo"] {
        client.send_text(word, &cancel).await?;
    }
    client.send_binary(vec![0xDE, 0xAD, 0xBE, 0xEF], &cancel).await?;

    let mut replies = 0;
    while replies < 4 {
        match compio::time::timeout(Duration::from_secs(2), events.recv_async()).await {
            Ok(Ok(SocketEvent::Text(text))) => {
                println!("  [client] text: {text}");
                replies += 1;
            }
            Ok(Ok(SocketEvent::Binary(data))) => {
                println!("  [client] binary: {data:02X?}");
                replies += 1;
            }
            Ok(Ok(other)) => println!("  [client] {other}"),
            _ => break,
        }
    }

    client.disconnect().await;
    println!("\n✓ Client disconnected ({replies} replies)");
    Ok(())
}
