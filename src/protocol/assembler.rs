//! Reassembly of fragmented inbound messages.
//!
//! Implements a small state machine:
//! - `Idle`: no fragment in progress; a final frame is passed through untouched
//! - `Accumulating`: non-final fragments have been buffered, waiting for the final one
//! - `Discarding`: the message in progress went over the size limit; its
//!   remaining fragments are swallowed up to and including the final one
//!
//! Each connection gets a fresh assembler, so a partial message never
//! survives a reconnect. The accumulator is dropped when a message completes.
//!
//! # Example
//!
//! ```
//! use pushwire_client::protocol::{FrameAssembler, InboundFrame};
//!
//! let mut assembler = FrameAssembler::new(1024);
//!
//! assert!(assembler.push(InboundFrame::fragment(&b"{\"px\":"[..])).unwrap().is_none());
//! let message = assembler.push(InboundFrame::complete(&b"101}"[..])).unwrap().unwrap();
//! assert_eq!(&message[..], b"{\"px\":101}");
//! ```

use bytes::{Bytes, BytesMut};

use super::InboundFrame;
use crate::error::{Result, SessionError};

/// State machine for message reassembly.
#[derive(Debug)]
enum State {
    /// No partial message buffered.
    Idle,
    /// Non-final fragments received so far.
    Accumulating(BytesMut),
    /// Rest of an oversized message, dropped until its final frame.
    Discarding,
}

/// Turns a stream of frames into complete logical messages.
#[derive(Debug)]
pub struct FrameAssembler {
    state: State,
    max_message_size: usize,
}

impl FrameAssembler {
    /// Create an assembler rejecting messages larger than `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            state: State::Idle,
            max_message_size,
        }
    }

    /// Feed one frame.
    ///
    /// Returns `Ok(Some(message))` when the frame completes a message and
    /// `Ok(None)` while fragments are still being collected. A message that
    /// grows past the size limit yields one protocol error; the rest of its
    /// fragments are then dropped silently until its final frame.
    ///
    /// Close frames are the caller's concern and must not be pushed.
    pub fn push(&mut self, frame: InboundFrame) -> Result<Option<Bytes>> {
        match &mut self.state {
            State::Idle if frame.is_final => {
                // Hot path: single-frame message, no buffering
                if frame.payload.len() > self.max_message_size {
                    return Err(self.oversized(frame.payload.len()));
                }
                Ok(Some(frame.payload))
            }
            State::Idle => {
                if frame.payload.len() > self.max_message_size {
                    self.state = State::Discarding;
                    return Err(self.oversized(frame.payload.len()));
                }
                let mut buffer = BytesMut::with_capacity(frame.payload.len() * 2);
                buffer.extend_from_slice(&frame.payload);
                self.state = State::Accumulating(buffer);
                Ok(None)
            }
            State::Accumulating(buffer) => {
                let total = buffer.len() + frame.payload.len();
                if total > self.max_message_size {
                    self.state = if frame.is_final {
                        State::Idle
                    } else {
                        State::Discarding
                    };
                    return Err(self.oversized(total));
                }
                buffer.extend_from_slice(&frame.payload);

                if !frame.is_final {
                    return Ok(None);
                }

                match std::mem::replace(&mut self.state, State::Idle) {
                    State::Accumulating(buffer) => Ok(Some(buffer.freeze())),
                    _ => Ok(None),
                }
            }
            State::Discarding => {
                if frame.is_final {
                    self.state = State::Idle;
                }
                Ok(None)
            }
        }
    }

    /// Whether a multi-frame message is in progress.
    pub fn is_assembling(&self) -> bool {
        matches!(self.state, State::Accumulating(_))
    }

    /// Whether the rest of an oversized message is being dropped.
    pub fn is_discarding(&self) -> bool {
        matches!(self.state, State::Discarding)
    }

    /// Number of bytes buffered for the message in progress.
    pub fn buffered_len(&self) -> usize {
        match &self.state {
            State::Accumulating(buffer) => buffer.len(),
            _ => 0,
        }
    }

    fn oversized(&self, size: usize) -> SessionError {
        SessionError::Protocol(format!(
            "Message size {} exceeds maximum {}",
            size, self.max_message_size
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_frame_passes_through_without_copy() {
        let mut assembler = FrameAssembler::new(1024);
        let payload = Bytes::from_static(b"tick");

        let message = assembler
            .push(InboundFrame::complete(payload.clone()))
            .unwrap()
            .unwrap();

        // Same memory: the hot path never buffers
        assert_eq!(message.as_ptr(), payload.as_ptr());
        assert!(!assembler.is_assembling());
    }

    #[test]
    fn test_fragments_concatenate_into_one_message() {
        let mut assembler = FrameAssembler::new(1024);

        assert!(assembler.push(InboundFrame::fragment(&b"ab"[..])).unwrap().is_none());
        assert!(assembler.push(InboundFrame::fragment(&b"cd"[..])).unwrap().is_none());
        assert!(assembler.is_assembling());
        assert_eq!(assembler.buffered_len(), 4);

        let message = assembler
            .push(InboundFrame::complete(&b"ef"[..]))
            .unwrap()
            .unwrap();
        assert_eq!(&message[..], b"abcdef");
        assert!(!assembler.is_assembling());
        assert_eq!(assembler.buffered_len(), 0);
    }

    #[test]
    fn test_messages_after_fragmented_one_are_independent() {
        let mut assembler = FrameAssembler::new(1024);

        assembler.push(InboundFrame::fragment(&b"first-"[..])).unwrap();
        let first = assembler.push(InboundFrame::complete(&b"part"[..])).unwrap();
        let second = assembler.push(InboundFrame::complete(&b"second"[..])).unwrap();

        assert_eq!(first.as_deref(), Some(&b"first-part"[..]));
        assert_eq!(second.as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn test_empty_final_fragment_completes() {
        let mut assembler = FrameAssembler::new(1024);
        assembler.push(InboundFrame::fragment(&b"xyz"[..])).unwrap();

        let message = assembler.push(InboundFrame::complete(Bytes::new())).unwrap();
        assert_eq!(message.as_deref(), Some(&b"xyz"[..]));
    }

    #[test]
    fn test_oversized_single_frame_rejected() {
        let mut assembler = FrameAssembler::new(4);
        let result = assembler.push(InboundFrame::complete(&b"too long"[..]));
        assert!(matches!(result, Err(SessionError::Protocol(_))));
    }

    #[test]
    fn test_oversized_accumulation_drops_rest_of_message() {
        let mut assembler = FrameAssembler::new(6);
        assembler.push(InboundFrame::fragment(&b"abcd"[..])).unwrap();

        let result = assembler.push(InboundFrame::fragment(&b"efgh"[..]));
        assert!(matches!(result, Err(SessionError::Protocol(_))));
        assert!(assembler.is_discarding());
        assert_eq!(assembler.buffered_len(), 0);

        // Tail of the dropped message never surfaces
        assert!(assembler.push(InboundFrame::fragment(&b"ij"[..])).unwrap().is_none());
        assert!(assembler.push(InboundFrame::complete(&b"kl"[..])).unwrap().is_none());
        assert!(!assembler.is_discarding());

        let message = assembler.push(InboundFrame::complete(&b"ok"[..])).unwrap();
        assert_eq!(message.as_deref(), Some(&b"ok"[..]));
    }

    #[test]
    fn test_oversized_first_fragment_drops_rest_of_message() {
        let mut assembler = FrameAssembler::new(4);

        let result = assembler.push(InboundFrame::fragment(&b"too long"[..]));
        assert!(matches!(result, Err(SessionError::Protocol(_))));
        assert!(assembler.push(InboundFrame::complete(&b"end"[..])).unwrap().is_none());

        let message = assembler.push(InboundFrame::complete(&b"next"[..])).unwrap();
        assert_eq!(message.as_deref(), Some(&b"next"[..]));
    }

    #[test]
    fn test_overflow_on_final_fragment_returns_to_idle() {
        let mut assembler = FrameAssembler::new(6);
        assembler.push(InboundFrame::fragment(&b"abcd"[..])).unwrap();

        let result = assembler.push(InboundFrame::complete(&b"efgh"[..]));
        assert!(matches!(result, Err(SessionError::Protocol(_))));
        assert!(!assembler.is_discarding());

        let message = assembler.push(InboundFrame::complete(&b"ok"[..])).unwrap();
        assert_eq!(message.as_deref(), Some(&b"ok"[..]));
    }
}
