//! Ticker Session - streaming subscription example.
//!
//! This example demonstrates:
//! - Building a session with topic subscriptions and an event handler
//! - Request/response over the same connection with `request`
//! - Watching status changes while the connection drops and heals
//!
//! # Running
//!
//! Without arguments the session talks to a simulated exchange over the
//! in-memory transport. Pass a WebSocket URI to use a real endpoint that
//! speaks the same `{"id","op","args"}` protocol:
//!
//! ```text
//! RUST_LOG=pushwire_client=debug cargo run --example ticker_session
//! cargo run --example ticker_session -- wss://stream.example.com/v1
//! ```

use std::sync::Arc;
use std::time::Duration;

use pushwire_client::codec::json::field_matcher;
use pushwire_client::transport::{MemoryConnector, MemoryPeer, MemoryServer};
use pushwire_client::{ConnectionStatus, SocketSession, TopicSubscriptions};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

/// Push event for a ticker topic.
#[derive(Deserialize, Debug)]
struct Ticker {
    topic: String,
    bid: f64,
    ask: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let topics = Arc::new(TopicSubscriptions::with_topics(["tickers.BTC-USD"]));

    let builder = SocketSession::builder()
        .max_reconnect_tries(Some(5))
        .reconnect_delay(Duration::from_millis(250))
        .request_timeout(Duration::from_secs(3))
        .subscriptions(topics.clone())
        .on_message(|event: Value| match serde_json::from_value::<Ticker>(event) {
            Ok(ticker) => println!("{:<16} bid {:>10.2}  ask {:>10.2}", ticker.topic, ticker.bid, ticker.ask),
            Err(_) => tracing::debug!("Ignoring non-ticker event"),
        });

    let (session, exchange) = match std::env::args().nth(1) {
        Some(uri) => (builder.uri(uri).build()?, None),
        None => {
            let (connector, server) = MemoryConnector::new();
            let session = builder
                .connector(connector)
                .uri("memory://simulated-exchange")
                .build()?;
            (session, Some(tokio::spawn(simulate_exchange(server))))
        }
    };

    let mut status = session.watch_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            println!("-- status: {current}");
        }
    });

    if session.connect().await != ConnectionStatus::Connected {
        eprintln!("could not connect to {}", session.uri());
        return Ok(());
    }

    topics.subscribe(&session, &["tickers.ETH-USD"]).await?;

    let id = session.next_request_id();
    let server_time = session
        .request(&json!({"id": id, "op": "time"}), field_matcher("id", id), None)
        .await?;
    println!("-- server time: {}", server_time["time"]);

    tokio::time::sleep(Duration::from_secs(3)).await;

    session.close().await?;
    let stats = session.stats();
    println!(
        "-- {} messages received, {} reconnects",
        stats.messages_received, stats.reconnects
    );

    if let Some(exchange) = exchange {
        exchange.abort();
    }
    Ok(())
}

/// Acks every request, streams tickers, and drops the first connection once.
async fn simulate_exchange(mut server: MemoryServer) {
    let mut connection = 0u32;
    while let Some(peer) = server.accept().await {
        connection += 1;
        let lifetime = if connection == 1 {
            Duration::from_millis(1200)
        } else {
            Duration::from_secs(60)
        };
        tokio::spawn(serve(peer, lifetime));
    }
}

async fn serve(mut peer: MemoryPeer, lifetime: Duration) {
    let deadline = tokio::time::sleep(lifetime);
    tokio::pin!(deadline);
    let mut ticks = tokio::time::interval(Duration::from_millis(300));
    let mut topics: Vec<String> = Vec::new();
    let mut price = 64_000.0;

    loop {
        tokio::select! {
            _ = &mut deadline => return,
            request = peer.recv_json() => {
                let Some(request) = request else { return };
                let id = request["id"].clone();
                match request["op"].as_str() {
                    Some("subscribe") => {
                        for topic in request["args"].as_array().into_iter().flatten() {
                            if let Some(topic) = topic.as_str() {
                                topics.push(topic.to_string());
                            }
                        }
                        peer.send_json(&json!({"id": id, "success": true}));
                    }
                    Some("unsubscribe") => {
                        topics.clear();
                        peer.send_json(&json!({"id": id, "success": true}));
                    }
                    Some("time") => {
                        peer.send_json(&json!({"id": id, "time": 1_760_000_000_000u64}));
                    }
                    _ => {
                        peer.send_json(&json!({"id": id, "success": false, "error": "unknown op"}));
                    }
                }
            }
            _ = ticks.tick() => {
                price += 12.5;
                for topic in &topics {
                    peer.send_json(&json!({"topic": topic, "bid": price - 0.5, "ask": price + 0.5}));
                }
            }
        }
    }
}
