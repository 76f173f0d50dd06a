//! Connection status and its change notifications.
//!
//! A session owns exactly one [`StatusBoard`]. Only the supervisor writes
//! to it. Everyone else observes through a `watch` receiver (latest value)
//! or a `broadcast` receiver (every transition, in order).

use std::fmt;

use tokio::sync::{broadcast, watch};

/// Connectivity state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Built, `connect` not called yet.
    Uninitialized,
    /// Between attempts, waiting out the reconnect delay.
    Waiting,
    /// Transport connect or resubscription in progress.
    Connecting,
    /// Transport open and subscriptions confirmed.
    Connected,
    /// Transport torn down, pumps stopped.
    Disconnected,
    /// Connection dropped; a reconnect is scheduled.
    Lost,
    /// Unrecoverable setup failure. `connect` may be called again.
    Error,
    /// Terminal. Nothing leaves this state.
    Closed,
}

impl ConnectionStatus {
    /// Whether this is the terminal state.
    #[inline]
    pub fn is_terminal(self) -> bool {
        self == ConnectionStatus::Closed
    }

    /// Whether a connect sequence is underway.
    #[inline]
    pub fn is_connecting(self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Waiting)
    }

    fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Uninitialized => "uninitialized",
            ConnectionStatus::Waiting => "waiting",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Lost => "lost",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
}

/// Holder of the current status plus its observers.
pub(crate) struct StatusBoard {
    current: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<StatusChange>,
}

impl StatusBoard {
    pub(crate) fn new(event_capacity: usize) -> Self {
        let (current, _) = watch::channel(ConnectionStatus::Uninitialized);
        let (events, _) = broadcast::channel(event_capacity);
        Self { current, events }
    }

    #[inline]
    pub(crate) fn get(&self) -> ConnectionStatus {
        *self.current.borrow()
    }

    /// Move to `to`. Returns `false` for a no-op or an attempt to leave `Closed`.
    pub(crate) fn transition(&self, to: ConnectionStatus) -> bool {
        let mut from = to;
        let changed = self.current.send_if_modified(|status| {
            if *status == to || status.is_terminal() {
                return false;
            }
            from = *status;
            *status = to;
            true
        });

        if changed {
            tracing::info!(%from, %to, "Connection status changed");
            // No subscribers is fine
            let _ = self.events.send(StatusChange { from, to });
        }
        changed
    }

    pub(crate) fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.current.subscribe()
    }

    pub(crate) fn events(&self) -> broadcast::Receiver<StatusChange> {
        self.events.subscribe()
    }
}
