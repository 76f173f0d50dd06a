//! Subscription replay.
//!
//! A [`SubscriptionProvider`] owns the set of subscriptions a host wants
//! active. The session never inspects or mutates that set: after every
//! transport connect it asks the provider to replay it, and on `close` it
//! asks the provider to tear it down. Both exchanges go through a
//! [`Requester`], usually as `send_and_wait` calls.
//!
//! [`TopicSubscriptions`] is a ready-made provider for JSON protocols that
//! subscribe by topic name:
//!
//! ```text
//! -> {"id": 7, "op": "subscribe", "args": ["tickers.BTC-USD", "trades.BTC-USD"]}
//! <- {"id": 7, "success": true}
//! <- {"id": 8, "success": false, "error": "unknown topic"}
//! ```

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::codec::MessageCodec;
use crate::error::Result;
use crate::pending::{MatchOutcome, Matcher};
use crate::session::{Requester, SocketSession};
use crate::status::ConnectionStatus;
use crate::transport::BoxFuture;

/// Host component replaying subscriptions on reconnect.
pub trait SubscriptionProvider<C: MessageCodec>: Send + Sync + 'static {
    /// Re-establish every subscription on a fresh connection.
    ///
    /// An error that is not a connection loss counts as a rejection and is
    /// retried after the reconnect delay, up to the attempt bound.
    fn resubscribe<'a>(&'a self, requester: &'a Requester<C>) -> BoxFuture<'a, Result<()>>;

    /// Cancel every subscription. Called by `close` while still connected.
    fn unsubscribe<'a>(&'a self, requester: &'a Requester<C>) -> BoxFuture<'a, Result<()>>;
}

/// Topic-based JSON subscriptions with `{"id","success","error"}` acks.
#[derive(Debug, Default)]
pub struct TopicSubscriptions {
    topics: Mutex<Vec<String>>,
}

impl TopicSubscriptions {
    /// Empty topic set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Topic set replayed from the first connect on.
    pub fn with_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let subscriptions = Self::new();
        subscriptions.insert(topics.into_iter().map(Into::into).collect());
        subscriptions
    }

    /// Current topics, in subscription order.
    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().clone()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.lock().iter().any(|t| t == topic)
    }

    pub fn len(&self) -> usize {
        self.topics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.lock().is_empty()
    }

    /// Add topics and, if the session is connected, subscribe to them now.
    ///
    /// Topics already present are skipped. A rejected subscription removes
    /// its topics again. If the connection is down the topics stay and are
    /// replayed on the next connect.
    pub async fn subscribe<C>(&self, session: &SocketSession<C>, topics: &[&str]) -> Result<()>
    where
        C: MessageCodec<Message = Value>,
    {
        let added = self.insert(topics.iter().map(|t| t.to_string()).collect());
        if added.is_empty() || session.status() != ConnectionStatus::Connected {
            return Ok(());
        }

        let result = exchange(&session.requester(), "subscribe", added.clone()).await;
        if let Err(e) = &result {
            if !e.is_connection_lost() {
                self.remove(&added);
            }
        }
        result
    }

    /// Remove topics and, if the session is connected, unsubscribe from them.
    pub async fn unsubscribe<C>(&self, session: &SocketSession<C>, topics: &[&str]) -> Result<()>
    where
        C: MessageCodec<Message = Value>,
    {
        let removed = self.remove(&topics.iter().map(|t| t.to_string()).collect::<Vec<_>>());
        if removed.is_empty() || session.status() != ConnectionStatus::Connected {
            return Ok(());
        }
        exchange(&session.requester(), "unsubscribe", removed).await
    }

    /// Insert missing topics, returning the ones actually added.
    fn insert(&self, topics: Vec<String>) -> Vec<String> {
        let mut current = self.topics.lock();
        let mut added = Vec::new();
        for topic in topics {
            if !current.contains(&topic) && !added.contains(&topic) {
                added.push(topic);
            }
        }
        current.extend(added.iter().cloned());
        added
    }

    /// Remove present topics, returning the ones actually removed.
    fn remove(&self, topics: &[String]) -> Vec<String> {
        let mut current = self.topics.lock();
        let removed: Vec<String> = topics
            .iter()
            .filter(|t| current.contains(t))
            .cloned()
            .collect();
        current.retain(|t| !removed.contains(t));
        removed
    }
}

impl<C> SubscriptionProvider<C> for TopicSubscriptions
where
    C: MessageCodec<Message = Value>,
{
    fn resubscribe<'a>(&'a self, requester: &'a Requester<C>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { exchange(requester, "subscribe", self.topics()).await })
    }

    fn unsubscribe<'a>(&'a self, requester: &'a Requester<C>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { exchange(requester, "unsubscribe", self.topics()).await })
    }
}

async fn exchange<C>(requester: &Requester<C>, op: &str, topics: Vec<String>) -> Result<()>
where
    C: MessageCodec<Message = Value>,
{
    if topics.is_empty() {
        return Ok(());
    }

    let id = requester.next_request_id();
    let request = json!({"id": id, "op": op, "args": topics});
    tracing::debug!(request_id = id, op, "Sending subscription request");

    requester.request(&request, ack_matcher(id), None).await?;
    Ok(())
}

/// Matcher for `{"id": id, "success": bool, "error"?: string}` acknowledgements.
///
/// `"success": false` turns into [`SessionError::RequestFailed`](crate::SessionError::RequestFailed) carrying
/// the `error` text. A message with the id but no `success` field is
/// accepted as the response.
pub fn ack_matcher(id: u64) -> Matcher<Value> {
    Matcher::with_outcome(move |message: &Value| {
        if message.get("id").and_then(Value::as_u64) != Some(id) {
            return MatchOutcome::Skip;
        }
        match message.get("success").and_then(Value::as_bool) {
            Some(false) => MatchOutcome::Reject(
                message
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("request rejected")
                    .to_string(),
            ),
            _ => MatchOutcome::Accept,
        }
    })
}
