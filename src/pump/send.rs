//! Send pump: drains the outbound queue onto one connection.
//!
//! The loop blocks on the queue's ready signal, never polls. On wake it
//! dequeues until empty, writing each item as one complete frame. The
//! cancellation token is checked before every dequeue and raced against
//! every write, so a pump whose connection was replaced stops taking items
//! meant for its successor. Each popped item is reported back to the queue
//! once its write ends, which is what `close` waits on.

use tokio_util::sync::CancellationToken;

use super::PumpExit;
use crate::outbound::OutboundQueue;
use crate::stats::SessionStats;
use crate::transport::FrameSink;

/// Run the send loop until cancelled or a write fails.
///
/// The sink is closed on the way out in every case.
pub(crate) async fn run_send_pump(
    mut sink: Box<dyn FrameSink>,
    queue: &OutboundQueue,
    cancel: &CancellationToken,
    stats: &SessionStats,
) -> PumpExit {
    let exit = pump(sink.as_mut(), queue, cancel, stats).await;

    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "Error closing sink");
    }
    exit
}

async fn pump(
    sink: &mut dyn FrameSink,
    queue: &OutboundQueue,
    cancel: &CancellationToken,
    stats: &SessionStats,
) -> PumpExit {
    loop {
        loop {
            if cancel.is_cancelled() {
                return PumpExit::Cancelled;
            }
            let Some(item) = queue.pop() else {
                break;
            };

            let len = item.len();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = sink.send(item) => Some(result),
            };
            queue.finish_write();

            match result {
                None => return PumpExit::Cancelled,
                Some(Ok(())) => {
                    SessionStats::incr(&stats.items_sent);
                    tracing::trace!(len, "Sent outbound item");
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Send failed");
                    return PumpExit::Failed(e);
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PumpExit::Cancelled,
            _ = queue.ready() => {}
        }
    }
}
