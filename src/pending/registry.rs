//! Registry of in-flight requests awaiting a response.
//!
//! Entries are keyed by a sequential id, so matchers are offered inbound
//! messages in registration order and the oldest live request wins.
//!
//! Every registration resolves exactly once, in one of three ways:
//! - a matching response completes it (success or explicit rejection)
//! - [`PendingRegistry::fail_all`] fails it on connection reset
//! - its deadline elapses and it fails with a timeout
//!
//! All mutation happens under one lock, so a response racing a reset or a
//! deadline can never complete the same entry twice.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::{MatchOutcome, Matcher};
use crate::error::{Result, SessionError};

struct PendingEntry<M> {
    matcher: Matcher<M>,
    tx: oneshot::Sender<Result<M>>,
    deadline: Instant,
    timeout: Duration,
}

struct RegistryState<M> {
    entries: BTreeMap<u64, PendingEntry<M>>,
    next_id: u64,
}

impl<M> RegistryState<M> {
    /// Fail every entry whose deadline has passed.
    fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(entry) = self.entries.remove(id) {
                tracing::debug!(request_id = id, timeout = ?entry.timeout, "Pending request expired");
                let _ = entry.tx.send(Err(SessionError::RequestTimeout(entry.timeout)));
            }
        }
        expired.len()
    }
}

/// Tracks outstanding request/response correlations. Cheap to clone.
pub struct PendingRegistry<M> {
    state: Arc<Mutex<RegistryState<M>>>,
}

impl<M> Clone for PendingRegistry<M> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<M> Default for PendingRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> PendingRegistry<M> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                entries: BTreeMap::new(),
                next_id: 1,
            })),
        }
    }

    /// Register a request and get a handle resolving within `timeout`.
    ///
    /// Register before sending the request so a fast response cannot slip
    /// past the matcher.
    pub fn register(&self, matcher: Matcher<M>, timeout: Duration) -> PendingRequest<M> {
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;

        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.entries.insert(
            id,
            PendingEntry {
                matcher,
                tx,
                deadline,
                timeout,
            },
        );
        tracing::trace!(request_id = id, pending = state.entries.len(), "Registered pending request");

        PendingRequest {
            id,
            timeout,
            deadline,
            rx,
            registry: Arc::downgrade(&self.state),
        }
    }

    /// Offer an inbound message to the live matchers.
    ///
    /// The first matcher that claims it completes its entry, which is removed.
    /// Returns the completed request id, or hands the message back when no
    /// request wants it.
    pub fn try_complete(&self, message: M) -> std::result::Result<u64, M> {
        let mut state = self.state.lock();
        state.expire(Instant::now());

        let hit = state
            .entries
            .iter()
            .find_map(|(id, entry)| match entry.matcher.check(&message) {
                MatchOutcome::Skip => None,
                outcome => Some((*id, outcome)),
            });

        let Some((id, outcome)) = hit else {
            return Err(message);
        };

        if let Some(entry) = state.entries.remove(&id) {
            let result = match outcome {
                MatchOutcome::Reject(reason) => Err(SessionError::RequestFailed(reason)),
                _ => Ok(message),
            };
            if entry.tx.send(result).is_err() {
                tracing::debug!(request_id = id, "Response arrived after the caller gave up");
            }
        }
        Ok(id)
    }

    /// Fail every pending request with the error produced by `reason` and
    /// clear the registry. Returns how many requests were failed.
    pub fn fail_all<F>(&self, reason: F) -> usize
    where
        F: Fn() -> SessionError,
    {
        let entries = std::mem::take(&mut self.state.lock().entries);
        let count = entries.len();

        for (_, entry) in entries {
            let _ = entry.tx.send(Err(reason()));
        }
        if count > 0 {
            tracing::debug!(count, "Failed all pending requests");
        }
        count
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether no request is pending.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Whether the request with `id` is still pending.
    pub fn contains(&self, id: u64) -> bool {
        self.state.lock().entries.contains_key(&id)
    }
}

/// Awaitable handle for one registered request.
///
/// Dropping the handle without waiting removes the entry.
pub struct PendingRequest<M> {
    id: u64,
    timeout: Duration,
    deadline: Instant,
    rx: oneshot::Receiver<Result<M>>,
    registry: Weak<Mutex<RegistryState<M>>>,
}

impl<M> PendingRequest<M> {
    /// Registry id of this request.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the response, a failure, or the deadline.
    pub async fn wait(mut self) -> Result<M> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::ConnectionLost),
            Err(_) => {
                if self.remove_entry() {
                    tracing::debug!(request_id = self.id, timeout = ?self.timeout, "Pending request timed out");
                    return Err(SessionError::RequestTimeout(self.timeout));
                }
                // Completed right at the deadline; the result is already in the channel
                match self.rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(SessionError::RequestTimeout(self.timeout)),
                }
            }
        }
    }

    fn remove_entry(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|state| state.lock().entries.remove(&self.id).is_some())
    }
}

impl<M> Drop for PendingRequest<M> {
    fn drop(&mut self) {
        self.remove_entry();
    }
}
