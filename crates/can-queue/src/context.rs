//! Shared CAN Counters
//!
//! Sequence numbers and traffic totals shared between the receive interrupt
//! and the main loop. The caller owns the context and passes it to both
//! sides; every field is atomic so neither side needs a lock.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Address used until configuration says otherwise
pub const DEFAULT_NODE_ADDRESS: u32 = 0xFF;

/// Counters for one CAN node
#[derive(Debug)]
pub struct CanContext {
    node_address: AtomicU32,
    rx_sequence: AtomicU32,
    tx_sequence: AtomicU32,
    rx_queued: AtomicU32,
    rx_dropped: AtomicU32,
    tx_sent: AtomicU32,
    tx_failed: AtomicU32,
    tx_rejected: AtomicU32,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanStats {
    pub node_address: u32,
    /// Last RX sequence number handed out
    pub rx_sequence: u32,
    /// Last TX sequence number handed out
    pub tx_sequence: u32,
    pub rx_queued: u32,
    pub rx_dropped: u32,
    pub tx_sent: u32,
    pub tx_failed: u32,
    pub tx_rejected: u32,
}

impl CanContext {
    pub fn new(node_address: u32) -> Self {
        Self {
            node_address: AtomicU32::new(node_address),
            rx_sequence: AtomicU32::new(0),
            tx_sequence: AtomicU32::new(0),
            rx_queued: AtomicU32::new(0),
            rx_dropped: AtomicU32::new(0),
            tx_sent: AtomicU32::new(0),
            tx_failed: AtomicU32::new(0),
            tx_rejected: AtomicU32::new(0),
        }
    }

    /// Zero every counter and set the node address
    pub fn reset(&self, node_address: u32) {
        self.node_address.store(node_address, Ordering::SeqCst);
        for counter in [
            &self.rx_sequence,
            &self.tx_sequence,
            &self.rx_queued,
            &self.rx_dropped,
            &self.tx_sent,
            &self.tx_failed,
            &self.tx_rejected,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    pub fn node_address(&self) -> u32 {
        self.node_address.load(Ordering::SeqCst)
    }

    pub fn set_node_address(&self, address: u32) {
        self.node_address.store(address, Ordering::SeqCst);
    }

    /// Claim the next receive sequence number (the first is 1)
    ///
    /// The counter wraps: after 2^32 claims it hands out 0 and numbers
    /// repeat from there.
    pub fn next_rx_sequence(&self) -> u32 {
        next(&self.rx_sequence)
    }

    /// Claim the next transmit sequence number (the first is 1)
    ///
    /// Wraps the same way as [`CanContext::next_rx_sequence`].
    pub fn next_tx_sequence(&self) -> u32 {
        next(&self.tx_sequence)
    }

    pub(crate) fn record_rx_queued(&self) {
        self.rx_queued.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_rx_dropped(&self) {
        self.rx_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_tx_sent(&self) {
        self.tx_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_tx_failed(&self) {
        self.tx_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_tx_rejected(&self) {
        self.tx_rejected.fetch_add(1, Ordering::SeqCst);
    }

    /// Received frames lost because the RX ring was full
    pub fn rx_dropped(&self) -> u32 {
        self.rx_dropped.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CanStats {
        CanStats {
            node_address: self.node_address(),
            rx_sequence: self.rx_sequence.load(Ordering::SeqCst),
            tx_sequence: self.tx_sequence.load(Ordering::SeqCst),
            rx_queued: self.rx_queued.load(Ordering::SeqCst),
            rx_dropped: self.rx_dropped(),
            tx_sent: self.tx_sent.load(Ordering::SeqCst),
            tx_failed: self.tx_failed.load(Ordering::SeqCst),
            tx_rejected: self.tx_rejected.load(Ordering::SeqCst),
        }
    }
}

impl Default for CanContext {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_ADDRESS)
    }
}

fn next(counter: &AtomicU32) -> u32 {
    counter.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_start_at_one() {
        let ctx = CanContext::default();
        assert_eq!(ctx.next_rx_sequence(), 1);
        assert_eq!(ctx.next_rx_sequence(), 2);
        assert_eq!(ctx.next_tx_sequence(), 1);
        assert_eq!(ctx.node_address(), DEFAULT_NODE_ADDRESS);
    }

    #[test]
    fn test_reset() {
        let ctx = CanContext::new(0x10);
        ctx.next_rx_sequence();
        ctx.record_rx_dropped();
        ctx.record_tx_sent();

        ctx.reset(0x20);

        let stats = ctx.stats();
        assert_eq!(
            stats,
            CanStats {
                node_address: 0x20,
                ..Default::default()
            }
        );
        assert_eq!(ctx.next_rx_sequence(), 1);
    }

    #[test]
    fn test_set_node_address_keeps_counters() {
        let ctx = CanContext::default();
        ctx.next_tx_sequence();

        ctx.set_node_address(0x42);

        assert_eq!(ctx.node_address(), 0x42);
        assert_eq!(ctx.stats().tx_sequence, 1);
    }

    #[test]
    fn test_sequence_wraps_to_zero() {
        let ctx = CanContext::default();
        ctx.rx_sequence.store(u32::MAX - 1, Ordering::SeqCst);

        assert_eq!(ctx.next_rx_sequence(), u32::MAX);
        assert_eq!(ctx.next_rx_sequence(), 0);
        assert_eq!(ctx.next_rx_sequence(), 1);
    }
}
