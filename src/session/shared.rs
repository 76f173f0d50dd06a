//! State shared by every handle of one session and by its background tasks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::MessageCodec;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::outbound::OutboundQueue;
use crate::pending::{Matcher, PendingRegistry};
use crate::stats::SessionStats;
use crate::status::StatusBoard;
use crate::subscription::SubscriptionProvider;
use crate::transport::Connector;

/// Callback receiving every decoded message no pending request claimed.
pub type MessageHandler<M> = Arc<dyn Fn(M) + Send + Sync>;

/// The open connection and the two tasks pumping it.
pub(crate) struct ActiveConnection {
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
    pub(crate) send_pump: JoinHandle<()>,
    pub(crate) receive_pump: JoinHandle<()>,
}

/// Lifecycle flags. Every check-and-set happens under one lock.
#[derive(Default)]
pub(crate) struct Lifecycle {
    /// A connect sequence (transport + resubscribe) is running.
    pub(crate) connecting: bool,
    /// A reset is tearing the connection down.
    pub(crate) resetting: bool,
    /// `close` was called or retries ran out. Never cleared.
    pub(crate) closing: bool,
    /// Bumped for every installed connection.
    pub(crate) generation: u64,
    /// Whether the session ever reached `Connected`.
    pub(crate) ever_connected: bool,
    pub(crate) active: Option<ActiveConnection>,
}

pub(crate) struct SessionCore<C: MessageCodec> {
    pub(crate) uri: String,
    pub(crate) config: SessionConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) codec: C,
    pub(crate) status: StatusBoard,
    pub(crate) registry: PendingRegistry<C::Message>,
    pub(crate) outbound: OutboundQueue,
    pub(crate) handler: Option<MessageHandler<C::Message>>,
    pub(crate) subscriptions: Option<Arc<dyn SubscriptionProvider<C>>>,
    pub(crate) lifecycle: Mutex<Lifecycle>,
    pub(crate) stats: SessionStats,
    /// Cancelled once the session is closing; parent of every connection token.
    pub(crate) shutdown: CancellationToken,
    request_ids: AtomicU64,
}

impl<C: MessageCodec> SessionCore<C> {
    pub(crate) fn new(
        uri: String,
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        codec: C,
        handler: Option<MessageHandler<C::Message>>,
        subscriptions: Option<Arc<dyn SubscriptionProvider<C>>>,
    ) -> Self {
        Self {
            status: StatusBoard::new(config.status_event_capacity),
            outbound: OutboundQueue::new(config.outbound_capacity, config.backpressure_timeout),
            registry: PendingRegistry::new(),
            lifecycle: Mutex::new(Lifecycle::default()),
            stats: SessionStats::default(),
            shutdown: CancellationToken::new(),
            request_ids: AtomicU64::new(1),
            uri,
            config,
            connector,
            codec,
            handler,
            subscriptions,
        }
    }

    #[inline]
    pub(crate) fn next_request_id(&self) -> u64 {
        self.request_ids.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn is_closing(&self) -> bool {
        self.lifecycle.lock().closing
    }

    /// Whether `generation` is still the installed connection.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.lifecycle
            .lock()
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }

    /// Queue an encoded payload for the send pump.
    pub(crate) async fn enqueue(&self, payload: Bytes) -> Result<()> {
        self.outbound.push(payload).await
    }

    /// Register a matcher, queue the request, and wait for the response.
    ///
    /// The matcher is registered first so a response racing the write is
    /// never missed.
    pub(crate) async fn exchange(
        &self,
        payload: Bytes,
        matcher: Matcher<C::Message>,
        timeout: Option<Duration>,
    ) -> Result<C::Message> {
        let timeout = timeout.unwrap_or(self.config.request_timeout);
        let pending = self.registry.register(matcher, timeout);
        let request_id = pending.id();

        self.outbound.push(payload).await?;

        let result = pending.wait().await;
        if let Err(SessionError::RequestTimeout(_)) = &result {
            SessionStats::incr(&self.stats.requests_timed_out);
            tracing::debug!(request_id, ?timeout, "Request timed out");
        }
        result
    }

    /// Route one complete inbound message: pending requests first, then the handler.
    pub(crate) fn dispatch(&self, payload: Bytes) {
        let message = match self.codec.decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                SessionStats::incr(&self.stats.decode_errors);
                tracing::warn!(error = %e, len = payload.len(), "Dropping undecodable message");
                return;
            }
        };
        SessionStats::incr(&self.stats.messages_received);

        match self.registry.try_complete(message) {
            Ok(request_id) => {
                SessionStats::incr(&self.stats.responses_matched);
                tracing::trace!(request_id, "Response matched pending request");
            }
            Err(message) => match &self.handler {
                Some(handler) => handler(message),
                None => {
                    SessionStats::incr(&self.stats.unclaimed_dropped);
                    tracing::debug!("No handler for unsolicited message, dropping");
                }
            },
        }
    }
}
