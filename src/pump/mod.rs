//! Per-connection pumps.
//!
//! Each open connection gets exactly two long-lived tasks:
//!
//! ```text
//! callers ─► OutboundQueue ─► send pump ─► FrameSink
//! FrameStream ─► receive pump ─► FrameAssembler ─► dispatch
//! ```
//!
//! Both loops stop on their connection's cancellation token. Any other exit
//! means the connection is unusable and the session has to reset it.

mod receive;
mod send;

use crate::error::SessionError;

pub(crate) use receive::run_receive_pump;
pub(crate) use send::run_send_pump;

/// Why a pump loop ended.
#[derive(Debug)]
pub(crate) enum PumpExit {
    /// The connection's token was cancelled. No reset needed.
    Cancelled,
    /// The remote side sent a protocol close frame.
    RemoteClosed,
    /// A transport read or write failed.
    Failed(SessionError),
}

impl PumpExit {
    /// Whether the session must tear the connection down.
    #[inline]
    pub(crate) fn needs_reset(&self) -> bool {
        !matches!(self, PumpExit::Cancelled)
    }
}
