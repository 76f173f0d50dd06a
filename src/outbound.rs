//! Outbound queue shared by callers and the send pump.
//!
//! Strict FIFO: items leave in the order they were pushed, never merged.
//! The queue outlives individual connections, but it is cleared on every
//! reset. That makes delivery at-most-once: items queued before a drop may
//! be lost.
//!
//! # Backpressure
//!
//! The queue holds at most `capacity` items. [`OutboundQueue::push`] waits
//! for room up to the push timeout, and [`OutboundQueue::try_push`] fails
//! immediately. Waiting is signal-driven: a pop wakes blocked producers.
//!
//! # Draining
//!
//! An item popped by the send pump stays in flight until the pump reports
//! the write finished. The queue only counts as drained when nothing is
//! queued and nothing is in flight.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Result, SessionError};

/// FIFO of encoded payloads waiting for the send pump.
#[derive(Debug)]
pub struct OutboundQueue {
    inner: Mutex<Inner>,
    capacity: usize,
    push_timeout: Duration,
    /// Signalled when an item is pushed.
    ready: Notify,
    /// Signalled when an item leaves the queue.
    space: Notify,
    /// Signalled when the queue becomes empty with no write in flight.
    drained: Notify,
}

#[derive(Debug)]
struct Inner {
    items: VecDeque<Bytes>,
    /// Popped but not yet written.
    in_flight: usize,
}

impl Inner {
    fn is_drained(&self) -> bool {
        self.items.is_empty() && self.in_flight == 0
    }
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize, push_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(1024)),
                in_flight: 0,
            }),
            capacity,
            push_timeout,
            ready: Notify::new(),
            space: Notify::new(),
            drained: Notify::new(),
        }
    }

    /// Enqueue an item, waiting for room if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Backpressure`] if no room frees up within the
    /// push timeout.
    pub async fn push(&self, item: Bytes) -> Result<()> {
        let deadline = Instant::now() + self.push_timeout;
        let mut item = item;

        loop {
            // Arm before checking so a pop between check and wait is not missed
            let space = self.space.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.enqueue(item) {
                Ok(()) => return Ok(()),
                Err(rejected) => item = rejected,
            }

            if tokio::time::timeout_at(deadline, space).await.is_err() {
                tracing::warn!(capacity = self.capacity, "Outbound queue full, giving up");
                return Err(SessionError::Backpressure);
            }
        }
    }

    /// Enqueue an item without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Backpressure`] if the queue is full.
    pub fn try_push(&self, item: Bytes) -> Result<()> {
        self.enqueue(item).map_err(|_| SessionError::Backpressure)
    }

    fn enqueue(&self, item: Bytes) -> std::result::Result<(), Bytes> {
        {
            let mut inner = self.inner.lock();
            if inner.items.len() >= self.capacity {
                return Err(item);
            }
            inner.items.push_back(item);
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Take the oldest item and mark it in flight.
    ///
    /// Every `Some` must be followed by [`OutboundQueue::finish_write`].
    pub(crate) fn pop(&self) -> Option<Bytes> {
        let item = {
            let mut inner = self.inner.lock();
            let item = inner.items.pop_front();
            if item.is_some() {
                inner.in_flight += 1;
            }
            item
        };

        if item.is_some() {
            self.space.notify_waiters();
        }
        item
    }

    /// The write of a popped item finished, successfully or not.
    pub(crate) fn finish_write(&self) {
        let drained = {
            let mut inner = self.inner.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);
            inner.is_drained()
        };
        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Wait until something was pushed since the last wake-up.
    ///
    /// Intended for the single active send pump; may wake spuriously.
    pub(crate) async fn ready(&self) {
        self.ready.notified().await;
    }

    /// Drop every queued item. Returns how many were dropped.
    pub(crate) fn clear(&self) -> usize {
        let dropped = {
            let mut inner = self.inner.lock();
            let dropped = inner.items.len();
            inner.items.clear();
            inner.in_flight = 0;
            dropped
        };
        self.space.notify_waiters();
        self.drained.notify_waiters();
        dropped
    }

    /// Wait until every queued item has been written, or `timeout` passes.
    /// Returns whether the queue drained.
    pub async fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            if self.inner.lock().is_drained() {
                return true;
            }
            if tokio::time::timeout_at(deadline, drained).await.is_err() {
                return self.inner.lock().is_drained();
            }
        }
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Whether producers would currently have to wait.
    pub fn is_backpressure_active(&self) -> bool {
        self.len() >= self.capacity
    }
}
