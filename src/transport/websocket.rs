//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Outbound payloads that are valid UTF-8 go out as text frames, anything
//! else as binary. Ping/pong is answered by tungstenite itself and never
//! reaches the session.

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{BoxFuture, Connection, Connector, FrameSink, FrameStream};
use crate::error::{Result, SessionError};
use crate::protocol::InboundFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector opening `ws://` / `wss://` connections.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl WebSocketConnector {
    /// Create a connector with no extra handshake headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header sent with every handshake (auth tokens, API keys).
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name or value is not a valid HTTP header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SessionError::Config(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SessionError::Config(format!("invalid header value: {e}")))?;
        self.headers.push((name, value));
        Ok(self)
    }
}

impl Connector for WebSocketConnector {
    fn connect<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<Connection>> {
        Box::pin(async move {
            let mut request = uri
                .into_client_request()
                .map_err(|e| SessionError::InvalidUri(format!("{uri}: {e}")))?;

            for (name, value) in &self.headers {
                request.headers_mut().insert(name.clone(), value.clone());
            }

            let (ws_stream, response) = connect_async(request).await.map_err(map_ws_error)?;
            tracing::debug!(uri, status = %response.status(), "WebSocket handshake complete");

            let (write, read) = ws_stream.split();
            Ok(Connection::new(
                WebSocketSink {
                    write,
                    closed: false,
                },
                WebSocketFrames { read },
            ))
        })
    }
}

fn map_ws_error(error: tungstenite::Error) -> SessionError {
    match error {
        tungstenite::Error::Url(e) => SessionError::InvalidUri(e.to_string()),
        tungstenite::Error::Io(e) => SessionError::Io(e),
        other => SessionError::Transport(other.to_string()),
    }
}

struct WebSocketSink {
    write: SplitSink<WsStream, Message>,
    closed: bool,
}

impl FrameSink for WebSocketSink {
    fn send(&mut self, payload: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let message = match String::from_utf8(payload.to_vec()) {
                Ok(text) => Message::text(text),
                Err(_) => Message::binary(payload),
            };
            self.write.send(message).await.map_err(map_ws_error)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.closed {
                return Ok(());
            }
            self.closed = true;

            match self.write.close().await {
                Ok(()) => Ok(()),
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    Ok(())
                }
                Err(e) => Err(map_ws_error(e)),
            }
        })
    }
}

struct WebSocketFrames {
    read: SplitStream<WsStream>,
}

impl FrameStream for WebSocketFrames {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<InboundFrame>> {
        Box::pin(async move {
            loop {
                let message = match self.read.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(map_ws_error(e)),
                    None => return Err(SessionError::Transport("WebSocket stream ended".into())),
                };

                match message {
                    Message::Text(text) => {
                        return Ok(InboundFrame::complete(Bytes::copy_from_slice(
                            text.as_bytes(),
                        )))
                    }
                    Message::Binary(data) => return Ok(InboundFrame::complete(data)),
                    Message::Frame(frame) => {
                        return Ok(InboundFrame {
                            payload: Bytes::copy_from_slice(frame.payload()),
                            is_final: frame.header().is_final,
                            is_close: false,
                        })
                    }
                    Message::Close(reason) => {
                        tracing::debug!(?reason, "Received WebSocket close frame");
                        return Ok(InboundFrame::close());
                    }
                    Message::Ping(_) | Message::Pong(_) => continue,
                }
            }
        })
    }
}
