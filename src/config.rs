//! Session configuration.
//!
//! All fields have defaults suitable for a long-lived market data session:
//! unlimited reconnect attempts with a fixed one second delay between them.

use std::time::Duration;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Default timeout for `send_and_wait` when the caller passes none.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum number of queued outbound items.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// Default time `send` waits for queue space.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound for a reassembled multi-frame message (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default time `close` waits for queued items to go out.
pub const DEFAULT_CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default buffer size of the status transition broadcast.
pub const DEFAULT_STATUS_EVENT_CAPACITY: usize = 64;

/// Configuration for a [`SocketSession`](crate::SocketSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Attempt bound for each of the connect and resubscribe phases.
    /// `None` retries forever.
    pub max_reconnect_tries: Option<u32>,
    /// Fixed delay between attempts.
    pub reconnect_delay: Duration,
    /// Timeout applied to requests that do not carry their own.
    pub request_timeout: Duration,
    /// Maximum queued outbound items before backpressure.
    pub outbound_capacity: usize,
    /// How long a send waits for queue space.
    pub backpressure_timeout: Duration,
    /// Maximum size of an assembled inbound message.
    pub max_message_size: usize,
    /// How long `close` waits for the outbound queue to drain.
    pub close_drain_timeout: Duration,
    /// Capacity of the status transition broadcast channel.
    pub status_event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_tries: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            close_drain_timeout: DEFAULT_CLOSE_DRAIN_TIMEOUT,
            status_event_capacity: DEFAULT_STATUS_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Whether `attempts` failed attempts have used up the budget.
    #[inline]
    pub fn retries_exhausted(&self, attempts: u32) -> bool {
        self.max_reconnect_tries
            .is_some_and(|max| attempts >= max)
    }

    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        use crate::error::SessionError;

        if self.outbound_capacity == 0 {
            return Err(SessionError::Config(
                "outbound_capacity must be greater than zero".into(),
            ));
        }
        if self.status_event_capacity == 0 {
            return Err(SessionError::Config(
                "status_event_capacity must be greater than zero".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(SessionError::Config(
                "max_message_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.max_reconnect_tries, None);
        assert_eq!(config.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unlimited_retries_never_exhaust() {
        let config = SessionConfig::default();
        assert!(!config.retries_exhausted(0));
        assert!(!config.retries_exhausted(u32::MAX));
    }

    #[test]
    fn test_bounded_retries() {
        let config = SessionConfig {
            max_reconnect_tries: Some(3),
            ..Default::default()
        };
        assert!(!config.retries_exhausted(2));
        assert!(config.retries_exhausted(3));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = SessionConfig {
            outbound_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
