//! Session builder and the public session handle.
//!
//! The [`SessionBuilder`] provides a fluent API for configuring the
//! endpoint, transport, codec, message handler and subscriptions. The
//! [`SocketSession`] owns the lifecycle:
//! 1. `connect` opens the transport and starts the pumps
//! 2. the subscription provider replays subscriptions
//! 3. status reaches `Connected`; sends and requests flow
//! 4. on a drop, in-flight work fails and the session reconnects
//! 5. `close` drains, unsubscribes and shuts down for good
//!
//! # Example
//!
//! ```no_run
//! use pushwire_client::{codec::json::field_matcher, SocketSession};
//! use serde_json::json;
//!
//! # async fn run() -> pushwire_client::Result<()> {
//! let session = SocketSession::builder()
//!     .uri("wss://stream.example.com/v1")
//!     .on_message(|event: serde_json::Value| println!("event: {event}"))
//!     .build()?;
//!
//! session.connect().await;
//!
//! let id = session.next_request_id();
//! let ack = session
//!     .request(&json!({"id": id, "op": "ping"}), field_matcher("id", id), None)
//!     .await?;
//! println!("ack: {ack}");
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod requester;
mod shared;
mod supervisor;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::codec::{JsonCodec, MessageCodec};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::pending::Matcher;
use crate::stats::StatsSnapshot;
use crate::status::{ConnectionStatus, StatusChange};
use crate::subscription::SubscriptionProvider;
use crate::transport::{Connector, WebSocketConnector};

use self::shared::SessionCore;

pub use self::shared::MessageHandler;
pub use self::requester::Requester;

/// Builder for configuring and creating a [`SocketSession`].
pub struct SessionBuilder<C: MessageCodec = JsonCodec> {
    uri: Option<String>,
    connector: Option<Arc<dyn Connector>>,
    codec: C,
    config: SessionConfig,
    handler: Option<MessageHandler<C::Message>>,
    subscriptions: Option<Arc<dyn SubscriptionProvider<C>>>,
}

impl SessionBuilder<JsonCodec> {
    /// Create a builder for a JSON session.
    pub fn new() -> Self {
        Self::with_codec(JsonCodec::new())
    }
}

impl Default for SessionBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: MessageCodec> SessionBuilder<C> {
    /// Create a builder using `codec` for every message.
    pub fn with_codec(codec: C) -> Self {
        Self {
            uri: None,
            connector: None,
            codec,
            config: SessionConfig::default(),
            handler: None,
            subscriptions: None,
        }
    }

    /// Set the endpoint. Required.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the transport.
    ///
    /// Default: [`WebSocketConnector`]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Bound each of the connect and resubscribe phases. `None` retries forever.
    ///
    /// Default: unlimited
    pub fn max_reconnect_tries(mut self, tries: Option<u32>) -> Self {
        self.config.max_reconnect_tries = tries;
        self
    }

    /// Set the fixed delay between attempts.
    ///
    /// Default: 1 second
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Set the timeout used by requests that pass none.
    ///
    /// Default: 10 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the maximum number of queued outbound items.
    ///
    /// Default: 1024
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_capacity = capacity;
        self
    }

    /// Set how long `send` waits for queue space.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.backpressure_timeout = timeout;
        self
    }

    /// Set the largest inbound message accepted after reassembly.
    ///
    /// Default: 16 MiB
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set how long `close` waits for queued items to go out.
    ///
    /// Default: 2 seconds
    pub fn close_drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_drain_timeout = timeout;
        self
    }

    /// Handle every decoded message no pending request claims.
    ///
    /// Runs on the receive task, in arrival order. Keep it short; hand heavy
    /// work to another task.
    pub fn on_message<F>(mut self, handler: F) -> Self
    where
        F: Fn(C::Message) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Set the provider replaying subscriptions after every connect.
    pub fn subscriptions<P>(mut self, provider: Arc<P>) -> Self
    where
        P: SubscriptionProvider<C>,
    {
        self.subscriptions = Some(provider);
        self
    }

    /// Validate the configuration and build the session.
    ///
    /// Nothing connects until [`SocketSession::connect`] is called.
    pub fn build(self) -> Result<SocketSession<C>> {
        let uri = self
            .uri
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| SessionError::Config("uri is required".into()))?;
        self.config.validate()?;

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));

        Ok(SocketSession {
            core: Arc::new(SessionCore::new(
                uri,
                self.config,
                connector,
                self.codec,
                self.handler,
                self.subscriptions,
            )),
        })
    }
}

/// A persistent, self-healing session. Cheap to clone.
///
/// Background tasks keep the session alive until [`SocketSession::close`]
/// is called; dropping the last handle does not close it.
pub struct SocketSession<C: MessageCodec = JsonCodec> {
    core: Arc<SessionCore<C>>,
}

impl<C: MessageCodec> Clone for SocketSession<C> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<C: MessageCodec> fmt::Debug for SocketSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketSession")
            .field("uri", &self.core.uri)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SocketSession<JsonCodec> {
    /// Create a builder for a JSON session.
    pub fn builder() -> SessionBuilder<JsonCodec> {
        SessionBuilder::new()
    }
}

impl<C: MessageCodec> SocketSession<C> {
    /// Run a connect sequence and return the status it ended in.
    ///
    /// Connect failures are never returned: they are retried per the
    /// configuration and reported through status changes. If a sequence is
    /// already running this returns immediately. The sequence runs on its
    /// own task, so dropping this future does not cancel it.
    pub async fn connect(&self) -> ConnectionStatus {
        let sequence = tokio::spawn(self.core.clone().connect());
        if let Err(e) = sequence.await {
            tracing::error!(error = %e, "Connect task panicked");
        }
        self.status()
    }

    /// Close the session for good.
    ///
    /// Stops accepting sends, waits up to the drain timeout for queued items,
    /// unsubscribes if the session was connected, then tears everything down.
    /// The session ends `Closed` even if unsubscribing fails; that error is
    /// returned. Calling `close` again just waits for `Closed`.
    pub async fn close(&self) -> Result<()> {
        let first = {
            let mut life = self.core.lifecycle.lock();
            !std::mem::replace(&mut life.closing, true)
        };
        if !first {
            self.wait_closed().await;
            return Ok(());
        }
        tracing::info!(uri = %self.core.uri, "Closing session");

        let mut result = Ok(());
        if self.status() == ConnectionStatus::Connected {
            let drained = self
                .core
                .outbound
                .wait_drained(self.core.config.close_drain_timeout)
                .await;
            if !drained {
                tracing::warn!(queued = self.core.outbound.len(), "Outbound queue not drained before close");
            }

            if let Some(provider) = &self.core.subscriptions {
                if let Err(e) = provider.unsubscribe(&self.requester()).await {
                    tracing::warn!(error = %e, "Unsubscribe failed during close");
                    result = Err(e);
                }
            }
        }

        self.core.clone().reset(true, None).await;
        self.wait_closed().await;
        result
    }

    async fn wait_closed(&self) {
        let mut status = self.core.status.watch();
        let _ = status.wait_for(|status| status.is_terminal()).await;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.core.is_closing() || self.status().is_terminal() {
            return Err(SessionError::SessionClosed);
        }
        Ok(())
    }

    /// Queue a raw payload (fire-and-forget).
    ///
    /// Items queued while disconnected go out on the next connection unless
    /// a reset discards them first.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionClosed`] after `close`,
    /// [`SessionError::Backpressure`] if the queue stayed full.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.ensure_open()?;
        self.core.enqueue(payload.into()).await
    }

    /// Queue a raw payload without waiting for queue space.
    pub fn try_send(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.ensure_open()?;
        self.core.outbound.try_push(payload.into())
    }

    /// Encode `value` with the session codec and queue it.
    pub async fn send_message<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let payload = self.core.codec.encode(value)?;
        self.send(payload).await
    }

    /// Queue a raw payload and wait for the message `matcher` accepts.
    ///
    /// `timeout` defaults to the configured request timeout. The call always
    /// resolves: with the response, with [`SessionError::RequestFailed`] if
    /// the matcher rejected it, with [`SessionError::ConnectionLost`] if the
    /// connection dropped, or with [`SessionError::RequestTimeout`].
    pub async fn send_and_wait(
        &self,
        payload: impl Into<Bytes>,
        matcher: Matcher<C::Message>,
        timeout: Option<Duration>,
    ) -> Result<C::Message> {
        self.ensure_open()?;
        self.core.exchange(payload.into(), matcher, timeout).await
    }

    /// Encode `value`, send it, and wait for the message `matcher` accepts.
    pub async fn request<T: Serialize + ?Sized>(
        &self,
        value: &T,
        matcher: Matcher<C::Message>,
        timeout: Option<Duration>,
    ) -> Result<C::Message> {
        let payload = self.core.codec.encode(value)?;
        self.send_and_wait(payload, matcher, timeout).await
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.core.status.get()
    }

    /// Receiver always holding the latest status.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.core.status.watch()
    }

    /// Receiver of every status transition from now on.
    pub fn status_events(&self) -> broadcast::Receiver<StatusChange> {
        self.core.status.events()
    }

    /// Next id from the session's monotonically increasing request counter.
    pub fn next_request_id(&self) -> u64 {
        self.core.next_request_id()
    }

    /// Snapshot of the session counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.core.stats.snapshot()
    }

    /// Number of requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.core.registry.len()
    }

    /// Number of outbound items not yet written.
    pub fn queued_items(&self) -> usize {
        self.core.outbound.len()
    }

    /// Whether `send` would currently have to wait for queue space.
    pub fn is_backpressure_active(&self) -> bool {
        self.core.outbound.is_backpressure_active()
    }

    /// Endpoint this session connects to.
    pub fn uri(&self) -> &str {
        &self.core.uri
    }

    /// The session's codec.
    pub fn codec(&self) -> &C {
        &self.core.codec
    }

    /// Effective configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    pub(crate) fn requester(&self) -> Requester<C> {
        Requester::new(self.core.clone())
    }
}
