//! Per-session counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated by the pumps and the supervisor.
#[derive(Debug, Default)]
pub(crate) struct SessionStats {
    pub(crate) items_sent: AtomicU64,
    pub(crate) messages_received: AtomicU64,
    pub(crate) responses_matched: AtomicU64,
    pub(crate) unclaimed_dropped: AtomicU64,
    pub(crate) decode_errors: AtomicU64,
    pub(crate) protocol_errors: AtomicU64,
    pub(crate) connect_attempts: AtomicU64,
    pub(crate) reconnects: AtomicU64,
    pub(crate) requests_timed_out: AtomicU64,
}

impl SessionStats {
    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            items_sent: self.items_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            responses_matched: self.responses_matched.load(Ordering::Relaxed),
            unclaimed_dropped: self.unclaimed_dropped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            requests_timed_out: self.requests_timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a session's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Outbound items written to a transport.
    pub items_sent: u64,
    /// Complete inbound messages decoded.
    pub messages_received: u64,
    /// Inbound messages that completed a pending request.
    pub responses_matched: u64,
    /// Unclaimed messages dropped for lack of a handler.
    pub unclaimed_dropped: u64,
    /// Messages the codec could not decode.
    pub decode_errors: u64,
    /// Frames rejected by the assembler.
    pub protocol_errors: u64,
    /// Transport connect attempts, failed ones included.
    pub connect_attempts: u64,
    /// Successful connects after the first one.
    pub reconnects: u64,
    /// `send_and_wait` calls that timed out.
    pub requests_timed_out: u64,
}
