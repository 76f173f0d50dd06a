//! Integration tests for pushwire-client.
//!
//! These tests drive whole sessions against the in-memory transport, with
//! real (short) timings.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

use pushwire_client::codec::json::field_matcher;
use pushwire_client::protocol::InboundFrame;
use pushwire_client::subscription::ack_matcher;
use pushwire_client::transport::{
    BoxFuture, Connection, Connector, FrameSink, FrameStream, MemoryConnector, MemoryPeer,
    MemoryServer,
};
use pushwire_client::{
    ConnectionStatus, SessionBuilder, SessionError, SocketSession, StatusChange,
    TopicSubscriptions,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(2);

fn builder(connector: &MemoryConnector) -> SessionBuilder {
    SocketSession::builder()
        .uri("memory://feed")
        .connector(connector.clone())
        .reconnect_delay(Duration::from_millis(10))
        .close_drain_timeout(Duration::from_millis(200))
}

async fn accept(server: &mut MemoryServer) -> MemoryPeer {
    tokio::time::timeout(WAIT, server.accept())
        .await
        .expect("no connection within deadline")
        .expect("connector dropped")
}

async fn wait_for(session: &SocketSession, status: ConnectionStatus) {
    let mut watcher = session.watch_status();
    tokio::time::timeout(WAIT, watcher.wait_for(|current| *current == status))
        .await
        .unwrap_or_else(|_| panic!("status never reached {status}"))
        .expect("status channel closed");
}

/// Read the next subscription request and acknowledge it.
async fn ack_next(peer: &mut MemoryPeer, success: bool) -> Value {
    let request = tokio::time::timeout(WAIT, peer.recv_json())
        .await
        .expect("no request within deadline")
        .expect("client closed");
    peer.send_json(&json!({"id": request["id"], "success": success, "error": "denied"}));
    request
}

fn drain_events(events: &mut tokio::sync::broadcast::Receiver<StatusChange>) -> Vec<ConnectionStatus> {
    std::iter::from_fn(|| events.try_recv().ok())
        .map(|change| change.to)
        .collect()
}

/// Connect fails twice, then succeeds within a bound of three attempts.
#[tokio::test]
async fn test_connect_retries_until_success() {
    let (connector, mut server) = MemoryConnector::new();
    connector.fail_next(2);
    let session = builder(&connector).max_reconnect_tries(Some(3)).build().unwrap();
    let mut events = session.status_events();

    assert_eq!(session.connect().await, ConnectionStatus::Connected);
    let _peer = accept(&mut server).await;

    assert_eq!(connector.connect_calls(), 3);
    assert_eq!(session.stats().connect_attempts, 3);
    assert_eq!(
        drain_events(&mut events),
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Waiting,
            ConnectionStatus::Connecting,
            ConnectionStatus::Waiting,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
        ]
    );
}

/// The same failures with a bound of two close the session.
#[tokio::test]
async fn test_connect_exhaustion_closes_session() {
    let (connector, mut server) = MemoryConnector::new();
    connector.fail_next(2);
    let session = builder(&connector).max_reconnect_tries(Some(2)).build().unwrap();

    assert_eq!(session.connect().await, ConnectionStatus::Closed);
    assert_eq!(connector.connect_calls(), 2);
    assert!(server.try_accept().is_none());
    assert!(matches!(
        session.send(&b"late"[..]).await,
        Err(SessionError::SessionClosed)
    ));
}

/// Concurrent connect calls open exactly one transport.
#[tokio::test]
async fn test_concurrent_connect_is_idempotent() {
    let (connector, mut server) = MemoryConnector::new();
    connector.set_connect_delay(Duration::from_millis(50));
    let session = builder(&connector).build().unwrap();

    tokio::join!(session.connect(), session.connect(), session.connect());
    wait_for(&session, ConnectionStatus::Connected).await;

    // A connected session ignores further connects too
    session.connect().await;

    let _peer = accept(&mut server).await;
    assert_eq!(connector.connect_calls(), 1);
    assert!(server.try_accept().is_none());
}

/// A request nobody answers fails at its deadline and leaves no entry behind.
#[tokio::test]
async fn test_send_and_wait_times_out() {
    let (connector, mut server) = MemoryConnector::new();
    let session = builder(&connector).build().unwrap();
    session.connect().await;
    let mut peer = accept(&mut server).await;

    let started = Instant::now();
    let result = session
        .send_and_wait(&br#"{"id":1,"op":"ping"}"#[..], field_matcher("id", 1), Some(Duration::from_millis(100)))
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(SessionError::RequestTimeout(_))));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(1));
    assert_eq!(session.pending_requests(), 0);
    assert_eq!(session.stats().requests_timed_out, 1);

    // The request did go out
    assert_eq!(peer.recv_json().await.unwrap()["op"], "ping");
}

/// Responses complete their request; everything else reaches the handler.
#[tokio::test]
async fn test_responses_and_unsolicited_messages_are_routed() {
    let (connector, mut server) = MemoryConnector::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let session = builder(&connector)
        .on_message(move |message: Value| {
            let _ = events_tx.send(message);
        })
        .build()
        .unwrap();
    session.connect().await;
    let mut peer = accept(&mut server).await;

    let responder = tokio::spawn(async move {
        let request = peer.recv_json().await.unwrap();
        peer.send_json(&json!({"topic": "tickers", "px": 101}));
        peer.send_json(&json!({"id": request["id"], "result": "pong"}));
        peer.send_json(&json!({"topic": "tickers", "px": 102}));
        peer
    });

    let id = session.next_request_id();
    let response = session
        .request(&json!({"id": id, "op": "ping"}), field_matcher("id", id), None)
        .await
        .unwrap();
    assert_eq!(response["result"], "pong");

    let first = tokio::time::timeout(WAIT, events_rx.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(WAIT, events_rx.recv()).await.unwrap().unwrap();
    assert_eq!(first["px"], 101);
    assert_eq!(second["px"], 102);

    let _peer = responder.await.unwrap();
    let stats = session.stats();
    assert_eq!(stats.responses_matched, 1);
    assert_eq!(stats.messages_received, 3);
}

/// An explicit rejection surfaces as `RequestFailed` to that caller only.
#[tokio::test]
async fn test_rejected_request_fails() {
    let (connector, mut server) = MemoryConnector::new();
    let session = builder(&connector).build().unwrap();
    session.connect().await;
    let mut peer = accept(&mut server).await;

    let responder = tokio::spawn(async move {
        ack_next(&mut peer, false).await;
        peer
    });

    let id = session.next_request_id();
    let result = session
        .request(&json!({"id": id, "op": "subscribe", "args": ["nope"]}), ack_matcher(id), None)
        .await;

    assert!(matches!(result, Err(SessionError::RequestFailed(reason)) if reason == "denied"));
    let _peer = responder.await.unwrap();
    assert_eq!(session.status(), ConnectionStatus::Connected);
}

/// A drop fails every pending request with `ConnectionLost`, then heals.
#[tokio::test]
async fn test_drop_fails_pending_requests_and_reconnects() {
    let (connector, mut server) = MemoryConnector::new();
    let session = builder(&connector).build().unwrap();
    session.connect().await;
    let mut peer = accept(&mut server).await;

    let waiters: Vec<_> = (1..=3u64)
        .map(|id| {
            let session = session.clone();
            tokio::spawn(async move {
                let payload = serde_json::to_vec(&json!({"id": id})).unwrap();
                session
                    .send_and_wait(payload, field_matcher("id", id), Some(Duration::from_secs(5)))
                    .await
            })
        })
        .collect();

    for _ in 0..3 {
        peer.recv().await.unwrap();
    }
    assert_eq!(session.pending_requests(), 3);
    drop(peer);

    for waiter in waiters {
        let result = tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap();
        assert!(matches!(result, Err(SessionError::ConnectionLost)));
    }
    assert_eq!(session.pending_requests(), 0);

    let _peer = accept(&mut server).await;
    wait_for(&session, ConnectionStatus::Connected).await;
    assert_eq!(session.stats().reconnects, 1);
}

/// A remote close frame is treated like a drop.
#[tokio::test]
async fn test_remote_close_reconnects() {
    let (connector, mut server) = MemoryConnector::new();
    let session = builder(&connector).build().unwrap();
    session.connect().await;
    let peer = accept(&mut server).await;
    let mut events = session.status_events();

    peer.close();
    let _peer = accept(&mut server).await;
    wait_for(&session, ConnectionStatus::Connected).await;

    assert_eq!(
        drain_events(&mut events),
        vec![
            ConnectionStatus::Disconnected,
            ConnectionStatus::Lost,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
        ]
    );
}

/// Items reach the transport in enqueue order.
#[tokio::test]
async fn test_outbound_items_keep_order() {
    let (connector, mut server) = MemoryConnector::new();
    let session = builder(&connector).build().unwrap();
    session.connect().await;
    let mut peer = accept(&mut server).await;

    for n in 0..100u32 {
        session.send_message(&json!({"seq": n})).await.unwrap();
    }

    for n in 0..100u32 {
        let message = tokio::time::timeout(WAIT, peer.recv_json()).await.unwrap().unwrap();
        assert_eq!(message["seq"], n);
    }
    assert_eq!(session.stats().items_sent, 100);
}

/// Sends made before connecting go out once the transport opens.
#[tokio::test]
async fn test_items_queued_before_connect_are_sent() {
    let (connector, mut server) = MemoryConnector::new();
    let session = builder(&connector).build().unwrap();

    session.send_message(&json!({"op": "hello"})).await.unwrap();
    session.connect().await;

    let mut peer = accept(&mut server).await;
    assert_eq!(peer.recv_json().await.unwrap()["op"], "hello");
}

/// Fragments are reassembled before decoding.
#[tokio::test]
async fn test_fragmented_message_is_dispatched_once() {
    let (connector, mut server) = MemoryConnector::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let session = builder(&connector)
        .on_message(move |message: Value| {
            let _ = events_tx.send(message);
        })
        .build()
        .unwrap();
    session.connect().await;
    let peer = accept(&mut server).await;

    peer.push(InboundFrame::fragment(&br#"{"topic":"#[..]));
    peer.push(InboundFrame::fragment(&br#""trades","qty""#[..]));
    peer.push(InboundFrame::complete(&br#":3}"#[..]));

    let message = tokio::time::timeout(WAIT, events_rx.recv()).await.unwrap().unwrap();
    assert_eq!(message, json!({"topic": "trades", "qty": 3}));
    assert!(events_rx.try_recv().is_err());
}

/// Fragments after an oversized prefix never reach the handler.
#[tokio::test]
async fn test_oversized_fragmented_message_is_dropped_whole() {
    let (connector, mut server) = MemoryConnector::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let session = builder(&connector)
        .max_message_size(16)
        .on_message(move |message: Value| {
            let _ = events_tx.send(message);
        })
        .build()
        .unwrap();
    session.connect().await;
    let peer = accept(&mut server).await;

    peer.push(InboundFrame::fragment(&br#"{"big":"aaaaaaaa"#[..]));
    peer.push(InboundFrame::fragment(&b"aaaa"[..]));
    // Tail that would decode on its own
    peer.push(InboundFrame::fragment(&br#"{"x":1"#[..]));
    peer.push(InboundFrame::complete(&b"}"[..]));
    peer.send_json(&json!({"ok": true}));

    let message = tokio::time::timeout(WAIT, events_rx.recv()).await.unwrap().unwrap();
    assert_eq!(message, json!({"ok": true}));
    assert!(events_rx.try_recv().is_err());
    assert_eq!(session.stats().protocol_errors, 1);
    assert_eq!(session.status(), ConnectionStatus::Connected);
}

/// Undecodable messages are dropped without touching the connection.
#[tokio::test]
async fn test_undecodable_message_is_dropped() {
    let (connector, mut server) = MemoryConnector::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let session = builder(&connector)
        .on_message(move |message: Value| {
            let _ = events_tx.send(message);
        })
        .build()
        .unwrap();
    session.connect().await;
    let peer = accept(&mut server).await;

    peer.send_text("not json");
    peer.send_json(&json!({"ok": true}));

    let message = tokio::time::timeout(WAIT, events_rx.recv()).await.unwrap().unwrap();
    assert_eq!(message["ok"], true);
    assert_eq!(session.stats().decode_errors, 1);
    assert_eq!(session.status(), ConnectionStatus::Connected);
}

/// Subscriptions are replayed before the session counts as connected, and
/// again after every reconnect.
#[tokio::test]
async fn test_reconnect_resubscribes() {
    let (connector, mut server) = MemoryConnector::new();
    let topics = Arc::new(TopicSubscriptions::with_topics(["tickers", "trades"]));
    let session = builder(&connector).subscriptions(topics.clone()).build().unwrap();

    let connecting = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    let mut peer = accept(&mut server).await;
    let request = ack_next(&mut peer, true).await;
    assert_eq!(request["op"], "subscribe");
    assert_eq!(request["args"], json!(["tickers", "trades"]));
    assert_eq!(connecting.await.unwrap(), ConnectionStatus::Connected);

    // Live change while connected
    let live = tokio::spawn({
        let session = session.clone();
        let topics = topics.clone();
        async move { topics.subscribe(&session, &["book"]).await }
    });
    let request = ack_next(&mut peer, true).await;
    assert_eq!(request["args"], json!(["book"]));
    live.await.unwrap().unwrap();

    drop(peer);
    let mut peer = accept(&mut server).await;
    assert_eq!(session.status(), ConnectionStatus::Connecting);
    let request = ack_next(&mut peer, true).await;
    assert_eq!(request["args"], json!(["tickers", "trades", "book"]));

    wait_for(&session, ConnectionStatus::Connected).await;
    assert_eq!(session.stats().reconnects, 1);
}

/// A drop during resubscription restarts from connect.
#[tokio::test]
async fn test_drop_during_resubscribe_starts_over() {
    let (connector, mut server) = MemoryConnector::new();
    let topics = Arc::new(TopicSubscriptions::with_topics(["tickers"]));
    let session = builder(&connector).subscriptions(topics).build().unwrap();
    let mut events = session.status_events();

    let connecting = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    let mut peer = accept(&mut server).await;
    peer.recv_json().await.unwrap();
    drop(peer);

    let mut peer = accept(&mut server).await;
    ack_next(&mut peer, true).await;
    wait_for(&session, ConnectionStatus::Connected).await;

    connecting.await.unwrap();
    assert_eq!(connector.connect_calls(), 2);
    assert!(server.try_accept().is_none());

    // Lost is settled before the restarted connect begins
    assert_eq!(
        drain_events(&mut events),
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Lost,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
        ]
    );
}

/// Rejected resubscription is retried up to the bound, then the session closes.
#[tokio::test]
async fn test_resubscribe_rejection_exhausts_retries() {
    let (connector, mut server) = MemoryConnector::new();
    let topics = Arc::new(TopicSubscriptions::with_topics(["tickers"]));
    let session = builder(&connector)
        .max_reconnect_tries(Some(2))
        .subscriptions(topics)
        .build()
        .unwrap();

    let connecting = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    let mut peer = accept(&mut server).await;
    ack_next(&mut peer, false).await;
    ack_next(&mut peer, false).await;

    assert_eq!(connecting.await.unwrap(), ConnectionStatus::Closed);
    assert_eq!(connector.connect_calls(), 1);
    // Transport released
    assert!(tokio::time::timeout(WAIT, peer.recv()).await.unwrap().is_none());
}

/// Close unsubscribes while connected, then ends in `Closed`.
#[tokio::test]
async fn test_close_unsubscribes() {
    let (connector, mut server) = MemoryConnector::new();
    let topics = Arc::new(TopicSubscriptions::with_topics(["tickers"]));
    let session = builder(&connector).subscriptions(topics.clone()).build().unwrap();

    let connecting = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });
    let mut peer = accept(&mut server).await;
    ack_next(&mut peer, true).await;
    connecting.await.unwrap();

    let closing = tokio::spawn({
        let session = session.clone();
        async move { session.close().await }
    });
    let request = ack_next(&mut peer, true).await;
    assert_eq!(request["op"], "unsubscribe");
    assert_eq!(request["args"], json!(["tickers"]));

    closing.await.unwrap().unwrap();
    assert_eq!(session.status(), ConnectionStatus::Closed);
    assert!(tokio::time::timeout(WAIT, peer.recv()).await.unwrap().is_none());

    // The host's topic set is untouched
    assert!(topics.contains("tickers"));
    // No reconnect after close
    assert!(server.try_accept().is_none());
}

/// Close drains what was already queued before tearing down.
#[tokio::test]
async fn test_close_drains_queue() {
    let (connector, mut server) = MemoryConnector::new();
    let session = builder(&connector).build().unwrap();
    session.connect().await;
    let mut peer = accept(&mut server).await;

    for n in 0..10u32 {
        session.send_message(&json!({"seq": n})).await.unwrap();
    }
    session.close().await.unwrap();

    let mut received = 0;
    while let Some(payload) = peer.recv().await {
        let message: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(message["seq"], received);
        received += 1;
    }
    assert_eq!(received, 10);
}

/// Transport whose writes take a while to land and whose reads never return.
#[derive(Clone, Default)]
struct SlowConnector {
    written: Arc<Mutex<Vec<Bytes>>>,
}

struct SlowSink {
    written: Arc<Mutex<Vec<Bytes>>>,
}

struct SilentStream;

impl Connector for SlowConnector {
    fn connect<'a>(&'a self, _uri: &'a str) -> BoxFuture<'a, pushwire_client::Result<Connection>> {
        let sink = SlowSink {
            written: self.written.clone(),
        };
        Box::pin(async move { Ok(Connection::new(sink, SilentStream)) })
    }
}

impl FrameSink for SlowSink {
    fn send(&mut self, payload: Bytes) -> BoxFuture<'_, pushwire_client::Result<()>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.written.lock().push(payload);
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, pushwire_client::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl FrameStream for SilentStream {
    fn next_frame(&mut self) -> BoxFuture<'_, pushwire_client::Result<InboundFrame>> {
        Box::pin(std::future::pending())
    }
}

/// Close waits for a write that is still in progress.
#[tokio::test]
async fn test_close_waits_for_write_in_progress() {
    let connector = SlowConnector::default();
    let session = SocketSession::builder()
        .uri("slow://feed")
        .connector(connector.clone())
        .close_drain_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    assert_eq!(session.connect().await, ConnectionStatus::Connected);

    session.send(&b"first order"[..]).await.unwrap();
    session.send(&b"last order"[..]).await.unwrap();
    session.close().await.unwrap();

    let written = connector.written.lock().clone();
    assert_eq!(written, vec![Bytes::from_static(b"first order"), Bytes::from_static(b"last order")]);
    assert_eq!(session.status(), ConnectionStatus::Closed);
}

/// Pending requests fail when the session closes.
#[tokio::test]
async fn test_close_fails_pending_requests() {
    let (connector, mut server) = MemoryConnector::new();
    let session = builder(&connector).build().unwrap();
    session.connect().await;
    let mut peer = accept(&mut server).await;

    let waiter = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .send_and_wait(&b"{\"id\":9}"[..], field_matcher("id", 9), Some(Duration::from_secs(5)))
                .await
        }
    });
    peer.recv().await.unwrap();

    session.close().await.unwrap();
    let result = tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap();
    assert!(matches!(result, Err(SessionError::ConnectionLost)));
}

/// Unrecoverable setup errors end in `Error`, which is not terminal.
#[tokio::test]
async fn test_invalid_uri_sets_error() {
    let session = SocketSession::builder()
        .uri("definitely not a uri")
        .reconnect_delay(Duration::from_millis(10))
        .build()
        .unwrap();

    assert_eq!(session.connect().await, ConnectionStatus::Error);
    assert!(!session.status().is_terminal());

    // Still usable: a second connect runs again and fails the same way
    assert_eq!(session.connect().await, ConnectionStatus::Error);
}
