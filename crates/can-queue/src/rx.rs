//! Receive Interrupt Ingestion
//!
//! Runs in interrupt context: moves one frame from the controller into the
//! RX ring per receive-ready signal. Nothing here blocks, allocates, logs or
//! touches the transmit path; lost frames are only counted, and the main
//! loop reports them later.

use crate::context::CanContext;
use crate::frame::RxFrame;
use can_driver::{BufferSelector, CanReceive, InterruptHandler, Interrupts};
use ring_buffer::Producer;

/// What a single receive-ready signal produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxOutcome {
    /// Controller had nothing pending
    Idle,
    /// Frame queued in the RX ring
    Queued { sequence: u32 },
    /// RX ring full, frame discarded
    Dropped { sequence: u32 },
}

/// Producer side of the RX path
pub struct RxIngest<'a, R, const N: usize> {
    receiver: R,
    source: BufferSelector,
    ring: Producer<'a, RxFrame, N>,
    context: &'a CanContext,
}

impl<'a, R: CanReceive, const N: usize> RxIngest<'a, R, N> {
    /// Ingest from the controller's receive FIFO
    pub fn new(receiver: R, ring: Producer<'a, RxFrame, N>, context: &'a CanContext) -> Self {
        Self {
            receiver,
            source: BufferSelector::Fifo,
            ring,
            context,
        }
    }

    /// Read from a different hardware buffer
    pub fn with_source(mut self, source: BufferSelector) -> Self {
        self.source = source;
        self
    }

    /// Handle one receive-ready signal
    pub fn on_receive_ready(&mut self) -> RxOutcome {
        // Someone else may have drained the controller already
        if !self.receiver.has_pending(self.source) {
            return RxOutcome::Idle;
        }

        let sequence = self.context.next_rx_sequence();
        let mut frame = match self.receiver.receive(self.source) {
            Ok((header, payload)) => RxFrame::unpack(&header, &payload),
            Err(err) => RxFrame::failed(err),
        };
        frame.sequence = sequence;

        match self.ring.push(frame) {
            Ok(()) => {
                self.context.record_rx_queued();
                RxOutcome::Queued { sequence }
            }
            Err(_) => {
                self.context.record_rx_dropped();
                RxOutcome::Dropped { sequence }
            }
        }
    }

    /// Frames waiting in the RX ring
    pub fn pending(&self) -> usize {
        self.ring.pending()
    }
}

impl<R: CanReceive, const N: usize> InterruptHandler for RxIngest<'_, R, N> {
    fn on_interrupt(&mut self, active: Interrupts) {
        if active.contains(Interrupts::RX) {
            self.on_receive_ready();
        }
    }
}
