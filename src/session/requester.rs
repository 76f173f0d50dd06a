use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use super::shared::SessionCore;
use crate::codec::MessageCodec;
use crate::error::{Result, SessionError};
use crate::pending::Matcher;

/// Session capability handed to a [`SubscriptionProvider`].
///
/// Unlike [`SocketSession`], a `Requester` keeps working after `close` has
/// stopped accepting caller sends, so the unsubscribe exchange can still
/// run. It fails with [`SessionError::SessionClosed`] once the session has
/// actually shut down.
///
/// [`SubscriptionProvider`]: crate::subscription::SubscriptionProvider
/// [`SocketSession`]: crate::SocketSession
pub struct Requester<C: MessageCodec> {
    core: Arc<SessionCore<C>>,
}

impl<C: MessageCodec> Clone for Requester<C> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<C: MessageCodec> fmt::Debug for Requester<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requester")
            .field("uri", &self.core.uri)
            .finish_non_exhaustive()
    }
}

impl<C: MessageCodec> Requester<C> {
    pub(crate) fn new(core: Arc<SessionCore<C>>) -> Self {
        Self { core }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.core.shutdown.is_cancelled() {
            return Err(SessionError::SessionClosed);
        }
        Ok(())
    }

    /// Next id from the session's request counter.
    pub fn next_request_id(&self) -> u64 {
        self.core.next_request_id()
    }

    /// The session's codec.
    pub fn codec(&self) -> &C {
        &self.core.codec
    }

    /// Queue a raw payload.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.ensure_alive()?;
        self.core.enqueue(payload.into()).await
    }

    /// Encode `value` and queue it.
    pub async fn send_message<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let payload = self.core.codec.encode(value)?;
        self.send(payload).await
    }

    /// Queue a raw payload and wait for the message `matcher` accepts.
    ///
    /// `timeout` defaults to the session's request timeout.
    pub async fn send_and_wait(
        &self,
        payload: impl Into<Bytes>,
        matcher: Matcher<C::Message>,
        timeout: Option<Duration>,
    ) -> Result<C::Message> {
        self.ensure_alive()?;
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
}
