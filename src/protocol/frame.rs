//! Inbound transport frame.
//!
//! # Example
//!
//! ```
//! use pushwire_client::protocol::InboundFrame;
//!
//! let frame = InboundFrame::text(r#"{"channel":"trades"}"#);
//! assert!(frame.is_final);
//! assert!(!frame.is_close);
//! ```

use bytes::Bytes;

/// One transport-level read unit, possibly a fragment of a larger message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
    /// Last fragment of its logical message.
    pub is_final: bool,
    /// The peer started a protocol close.
    pub is_close: bool,
}

impl InboundFrame {
    /// A complete single-frame message.
    #[inline]
    pub fn complete(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            is_final: true,
            is_close: false,
        }
    }

    /// A non-final fragment; more frames follow.
    #[inline]
    pub fn fragment(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            is_final: false,
            is_close: false,
        }
    }

    /// A complete message from text (copies data).
    #[inline]
    pub fn text(text: &str) -> Self {
        Self::complete(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// A protocol close frame.
    #[inline]
    pub fn close() -> Self {
        Self {
            payload: Bytes::new(),
            is_final: true,
            is_close: true,
        }
    }

    /// Get the payload length.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
