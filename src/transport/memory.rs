//! In-process transport with a scriptable server side.
//!
//! [`MemoryConnector`] plays the client side of a connection, while
//! [`MemoryServer`] accepts each connection as a [`MemoryPeer`] that can read
//! what the session sent and push frames back. Connect failures and connect
//! latency can be injected, and connect calls are counted.
//!
//! # Example
//!
//! ```
//! use pushwire_client::transport::{Connector, MemoryConnector};
//!
//! # async fn run() -> pushwire_client::Result<()> {
//! let (connector, mut server) = MemoryConnector::new();
//! connector.fail_next(1);
//!
//! assert!(connector.connect("memory://feed").await.is_err());
//! let _connection = connector.connect("memory://feed").await?;
//!
//! let peer = server.accept().await.unwrap();
//! assert_eq!(peer.uri(), "memory://feed");
//! assert_eq!(connector.connect_calls(), 2);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{BoxFuture, Connection, Connector, FrameSink, FrameStream};
use crate::error::{Result, SessionError};
use crate::protocol::InboundFrame;

struct ConnectorState {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    scripted_failures: Mutex<u32>,
    connect_delay: Mutex<Duration>,
    connect_calls: AtomicUsize,
}

/// Client side of the in-memory transport. Cheap to clone.
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<ConnectorState>,
}

impl MemoryConnector {
    /// Create a connector and the server that receives its connections.
    pub fn new() -> (Self, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(ConnectorState {
                accept_tx,
                scripted_failures: Mutex::new(0),
                connect_delay: Mutex::new(Duration::ZERO),
                connect_calls: AtomicUsize::new(0),
            }),
        };
        (connector, MemoryServer { accept_rx })
    }

    /// Make the next `count` connect attempts fail with a transport error.
    pub fn fail_next(&self, count: u32) {
        *self.state.scripted_failures.lock() = count;
    }

    /// Delay every connect attempt by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = delay;
    }

    /// Number of connect calls made so far, failed ones included.
    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::Acquire)
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<Connection>> {
        Box::pin(async move {
            self.state.connect_calls.fetch_add(1, Ordering::AcqRel);

            let delay = *self.state.connect_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            {
                let mut failures = self.state.scripted_failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(SessionError::Transport("connection refused (scripted)".into()));
                }
            }

            let (client_tx, client_rx) = mpsc::unbounded_channel();
            let (server_tx, server_rx) = mpsc::unbounded_channel();

            let peer = MemoryPeer {
                uri: uri.to_string(),
                from_client: client_rx,
                to_client: server_tx,
            };
            self.state
                .accept_tx
                .send(peer)
                .map_err(|_| SessionError::Transport("memory server is gone".into()))?;

            Ok(Connection::new(
                MemorySink {
                    tx: Some(client_tx),
                },
                MemoryFrames { rx: server_rx },
            ))
        })
    }
}

/// Accepts connections opened through a [`MemoryConnector`].
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Wait for the next connection. `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Take an already pending connection without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.try_recv().ok()
    }
}

/// Server end of one in-memory connection.
///
/// Dropping the peer drops the connection: the session's next read fails.
pub struct MemoryPeer {
    uri: String,
    from_client: mpsc::UnboundedReceiver<Bytes>,
    to_client: mpsc::UnboundedSender<Result<InboundFrame>>,
}

impl MemoryPeer {
    /// URI the client connected to.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Next payload written by the client. `None` once the client closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.from_client.recv().await
    }

    /// Next payload if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.from_client.try_recv().ok()
    }

    /// Next payload decoded as JSON. Undecodable payloads are skipped.
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        loop {
            let payload = self.recv().await?;
            if let Ok(value) = serde_json::from_slice(&payload) {
                return Some(value);
            }
        }
    }

    /// Push a frame to the client. Returns `false` if the client is gone.
    pub fn push(&self, frame: InboundFrame) -> bool {
        self.to_client.send(Ok(frame)).is_ok()
    }

    /// Push a complete text message.
    pub fn send_text(&self, text: &str) -> bool {
        self.push(InboundFrame::text(text))
    }

    /// Push a complete JSON message.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        self.send_text(&value.to_string())
    }

    /// Send a protocol close frame.
    pub fn close(&self) -> bool {
        self.push(InboundFrame::close())
    }

    /// Make the client's next read fail with a transport error.
    pub fn fail(&self, reason: &str) -> bool {
        self.to_client
            .send(Err(SessionError::Transport(reason.to_string())))
            .is_ok()
    }

    /// Whether the client still holds the read half.
    pub fn is_connected(&self) -> bool {
        !self.to_client.is_closed()
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
}

impl FrameSink for MemorySink {
    fn send(&mut self, payload: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| SessionError::Transport("sink closed".into()))?;
            tx.send(payload)
                .map_err(|_| SessionError::Transport("peer disconnected".into()))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.tx.take();
            Ok(())
        })
    }
}

struct MemoryFrames {
    rx: mpsc::UnboundedReceiver<Result<InboundFrame>>,
}

impl FrameStream for MemoryFrames {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<InboundFrame>> {
        Box::pin(async move {
            match self.rx.recv().await {
                Some(frame) => frame,
                None => Err(SessionError::Transport("peer disconnected".into())),
            }
        })
    }
}
