//! Transmit Queue and Drain
//!
//! Application code queues frames from the main loop; the same loop drains
//! them to the controller once per tick.

use crate::context::CanContext;
use crate::error::CanError;
use crate::frame::TxFrame;
use can_driver::{BufferSelector, CanTransmit};
use ring_buffer::RingBuffer;
use tracing::{debug, warn};

/// Result of one drain pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing was queued; the controller was not touched
    Empty,
    Drained(DrainReport),
}

/// Frames handled by one drain pass, in queue order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Frames accepted by the controller
    pub transmitted: Vec<TxFrame>,
    /// Frames the controller rejected, with `error` set; they are not retried
    pub failed: Vec<TxFrame>,
}

impl DrainReport {
    /// Number of frames taken off the queue
    pub fn len(&self) -> usize {
        self.transmitted.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Main-loop transmit queue
pub struct TxQueue<const N: usize> {
    ring: RingBuffer<TxFrame, N>,
    buffer: BufferSelector,
}

impl<const N: usize> TxQueue<N> {
    /// Queue that transmits through any free hardware buffer
    pub fn new() -> Self {
        Self::with_buffer(BufferSelector::AnyTx)
    }

    /// Queue that transmits through the given hardware buffer
    pub fn with_buffer(buffer: BufferSelector) -> Self {
        Self {
            ring: RingBuffer::new(),
            buffer,
        }
    }

    pub fn set_buffer(&mut self, buffer: BufferSelector) {
        self.buffer = buffer;
    }

    /// Stamp `frame` with the next TX sequence number and queue it
    ///
    /// The sequence number is used up even when the queue is full.
    pub fn enqueue(&mut self, mut frame: TxFrame, context: &CanContext) -> Result<u32, CanError> {
        let sequence = context.next_tx_sequence();
        frame.sequence = sequence;

        match self.ring.push(frame) {
            Ok(()) => Ok(sequence),
            Err(rejected) => {
                context.record_tx_rejected();
                warn!(
                    "TX buffer full, dropping msg num[{}] to {:#X}",
                    sequence,
                    rejected.into_inner().id
                );
                Err(CanError::TxBufferFull { sequence })
            }
        }
    }

    /// Pack `payload` for `destination_id` and queue it
    pub fn send(
        &mut self,
        destination_id: u32,
        payload: &[u8],
        context: &CanContext,
    ) -> Result<u32, CanError> {
        let frame = TxFrame::pack(destination_id, payload)?;
        self.enqueue(frame, context)
    }

    /// Send every frame queued at entry, oldest first
    ///
    /// Each frame gets exactly one transmit attempt.
    pub fn drain<T: CanTransmit>(&mut self, transmitter: &mut T, context: &CanContext) -> DrainOutcome {
        let count = self.ring.pending();
        if count == 0 {
            return DrainOutcome::Empty;
        }

        let mut report = DrainReport::default();
        for _ in 0..count {
            let Ok(mut frame) = self.ring.pop() else {
                break;
            };

            match transmitter.transmit(&frame.header(), &frame.payload, self.buffer) {
                Ok(()) => {
                    context.record_tx_sent();
                    report.transmitted.push(frame);
                }
                Err(err) => {
                    warn!("CAN message sending error on msg num[{}]: {}", frame.sequence, err);
                    context.record_tx_failed();
                    frame.error = err.code();
                    report.failed.push(frame);
                }
            }
        }

        metrics::counter!("can_tx_frames_total").increment(report.transmitted.len() as u64);
        metrics::counter!("can_tx_failures_total").increment(report.failed.len() as u64);
        debug!(
            "Drained {} TX frames ({} failed)",
            report.len(),
            report.failed.len()
        );
        DrainOutcome::Drained(report)
    }

    /// Frames waiting to be sent
    pub fn pending(&self) -> usize {
        self.ring.pending()
    }

    /// Oldest queued frame
    pub fn peek(&self) -> Option<&TxFrame> {
        self.ring.peek().ok()
    }

    /// Discard every queued frame
    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

impl<const N: usize> Default for TxQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
