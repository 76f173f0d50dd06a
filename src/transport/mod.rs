//! Transport module - the boundary between the session and the wire.
//!
//! A [`Connector`] opens one connection per attempt and hands back its two
//! halves. The [`FrameSink`] is owned by the send pump and the
//! [`FrameStream`] by the receive pump. The session never mutates a live
//! connection. On reconnect it asks the connector for a fresh pair.
//!
//! Provided implementations:
//! - [`WebSocketConnector`] - `tokio-tungstenite` client
//! - [`MemoryConnector`] - in-process scripted transport for tests and simulations

mod memory;
mod websocket;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::InboundFrame;

pub use memory::{MemoryConnector, MemoryPeer, MemoryServer};
pub use websocket::WebSocketConnector;

/// Boxed future used at the object-safe transport seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Write half of an open connection.
pub trait FrameSink: Send + 'static {
    /// Write one payload as one complete frame.
    fn send(&mut self, payload: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Close the connection. Idempotent.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Read half of an open connection.
pub trait FrameStream: Send + 'static {
    /// Wait for the next frame.
    ///
    /// An error means the connection is unusable.
    fn next_frame(&mut self) -> BoxFuture<'_, Result<InboundFrame>>;
}

/// An open connection, split into its two halves.
pub struct Connection {
    /// Write half, owned by the send pump.
    pub sink: Box<dyn FrameSink>,
    /// Read half, owned by the receive pump.
    pub stream: Box<dyn FrameStream>,
}

impl Connection {
    /// Create a connection from its halves.
    pub fn new(sink: impl FrameSink, stream: impl FrameStream) -> Self {
        Self {
            sink: Box::new(sink),
            stream: Box::new(stream),
        }
    }
}

/// Factory for connections.
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to `uri`.
    fn connect<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<Connection>>;
}
