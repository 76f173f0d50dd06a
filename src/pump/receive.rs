//! Receive pump: one continuous read loop per connection.
//!
//! Frames are read one at a time and fed to the connection's
//! [`FrameAssembler`]. Every complete message is handed to `dispatch` in
//! read order, on this task. Oversized messages are dropped without
//! touching the connection.

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::PumpExit;
use crate::protocol::FrameAssembler;
use crate::stats::SessionStats;
use crate::transport::FrameStream;

/// Run the read loop until cancelled, closed by the remote, or a read fails.
pub(crate) async fn run_receive_pump<F>(
    mut stream: Box<dyn FrameStream>,
    mut assembler: FrameAssembler,
    cancel: &CancellationToken,
    stats: &SessionStats,
    mut dispatch: F,
) -> PumpExit
where
    F: FnMut(Bytes),
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PumpExit::Cancelled,
            frame = stream.next_frame() => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Receive failed");
                return PumpExit::Failed(e);
            }
        };

        if frame.is_close {
            tracing::debug!("Received close frame");
            return PumpExit::RemoteClosed;
        }

        match assembler.push(frame) {
            Ok(Some(message)) => {
                // Replaced while reading: the message belongs to no live connection
                if cancel.is_cancelled() {
                    return PumpExit::Cancelled;
                }
                tracing::trace!(len = message.len(), "Dispatching inbound message");
                dispatch(message);
            }
            Ok(None) => {}
            Err(e) => {
                SessionStats::incr(&stats.protocol_errors);
                tracing::warn!(error = %e, "Dropping inbound message");
            }
        }
    }
}
