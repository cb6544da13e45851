//! CAN Bus Bring-up

use crate::context::{CanContext, DEFAULT_NODE_ADDRESS};
use crate::error::CanError;
use crate::frame::RxFrame;
use crate::tx::TxQueue;
use can_driver::{BufferSelector, CanControl, Interrupts, OperatingMode, STANDARD_ID_MAX};
use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Capacity of the receive ring
pub const RX_CAPACITY: usize = 32;

/// Capacity of the transmit ring
pub const TX_CAPACITY: usize = 32;

/// Receive ring shared between the interrupt and the main loop
pub type RxRing = RingBuffer<RxFrame, RX_CAPACITY>;

/// Transmit queue owned by the main loop
pub type TxRing = TxQueue<TX_CAPACITY>;

/// Bus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// This node's CAN address
    pub node_address: u32,
    /// Controller operating mode after setup
    pub mode: OperatingMode,
    /// CAN clock presented to the controller (Hz)
    pub clock_hz: u32,
    /// Bus bit rate (bit/s)
    pub bitrate: u32,
    /// Hardware buffer used for transmit
    pub tx_buffer: BufferSelector,
    /// Hardware buffer read on receive interrupts
    pub rx_buffer: BufferSelector,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            node_address: DEFAULT_NODE_ADDRESS,
            mode: OperatingMode::Normal,
            clock_hz: 40_000_000,
            bitrate: 500_000,
            tx_buffer: BufferSelector::AnyTx,
            rx_buffer: BufferSelector::Fifo,
        }
    }
}

impl BusConfig {
    /// Loopback configuration for running without a bus
    pub fn loopback() -> Self {
        Self {
            mode: OperatingMode::Loopback,
            ..Default::default()
        }
    }
}

/// Reset queues and counters, then bring the controller up
///
/// Runs before the receive interrupt is attached: the RX ring must not be
/// split while this executes. The node address must be a standard
/// identifier; nothing is touched if it is not.
pub fn setup<C: CanControl, const RX: usize, const TX: usize>(
    controller: &mut C,
    config: &BusConfig,
    context: &CanContext,
    rx_ring: &mut RingBuffer<RxFrame, RX>,
    tx_queue: &mut TxQueue<TX>,
) -> Result<(), CanError> {
    if config.node_address > STANDARD_ID_MAX {
        return Err(CanError::InvalidIdentifier {
            id: config.node_address,
            extended: false,
        });
    }

    context.reset(config.node_address);
    rx_ring.clear();
    tx_queue.clear();
    tx_queue.set_buffer(config.tx_buffer);

    controller.init(config.mode);
    controller.set_baud(config.clock_hz, config.bitrate)?;
    controller.enable_interrupt(Interrupts::RX);

    info!(
        "CAN bus up: address={:#X}, mode={:?}, bitrate={}",
        config.node_address, config.mode, config.bitrate
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_driver::{PeripheralError, SimulatedController};

    #[test]
    fn test_setup_resets_and_configures() {
        let ctx = CanContext::new(0x01);
        ctx.next_rx_sequence();
        let mut rx_ring: RxRing = RingBuffer::new();
        rx_ring.push(RxFrame::default()).unwrap();
        let mut tx_queue: TxRing = TxQueue::new();
        tx_queue.send(0x5, &[1], &ctx).unwrap();

        let mut ctrl = SimulatedController::new();
        setup(
            &mut ctrl,
            &BusConfig::default(),
            &ctx,
            &mut rx_ring,
            &mut tx_queue,
        )
        .unwrap();

        assert!(rx_ring.is_empty());
        assert_eq!(tx_queue.pending(), 0);
        assert_eq!(ctx.node_address(), 0xFF);
        assert_eq!(ctx.next_rx_sequence(), 1);
        assert_eq!(ctrl.mode(), OperatingMode::Normal);
        assert_eq!(ctrl.bitrate(), Some(500_000));
        assert!(ctrl.enabled_interrupts().contains(Interrupts::RX));
    }

    #[test]
    fn test_setup_propagates_baud_error() {
        let ctx = CanContext::default();
        let mut rx_ring: RxRing = RingBuffer::new();
        let mut tx_queue: TxRing = TxQueue::new();
        let mut ctrl = SimulatedController::new();
        let config = BusConfig {
            bitrate: 300_000,
            ..Default::default()
        };

        let err = setup(&mut ctrl, &config, &ctx, &mut rx_ring, &mut tx_queue).unwrap_err();
        assert!(matches!(
            err,
            CanError::Peripheral(PeripheralError::BaudNotDivisible)
        ));
        assert!(!ctrl.enabled_interrupts().contains(Interrupts::RX));
    }

    #[test]
    fn test_setup_rejects_extended_node_address() {
        let ctx = CanContext::new(0x01);
        let mut rx_ring: RxRing = RingBuffer::new();
        rx_ring.push(RxFrame::default()).unwrap();
        let mut tx_queue: TxRing = TxQueue::new();
        let mut ctrl = SimulatedController::new();
        let config = BusConfig {
            node_address: 0x800,
            ..BusConfig::loopback()
        };

        let err = setup(&mut ctrl, &config, &ctx, &mut rx_ring, &mut tx_queue).unwrap_err();
        assert!(matches!(
            err,
            CanError::InvalidIdentifier {
                id: 0x800,
                extended: false
            }
        ));
        // Rejected before anything was reset or brought up
        assert_eq!(ctx.node_address(), 0x01);
        assert_eq!(rx_ring.pending(), 1);
        assert_eq!(ctrl.mode(), OperatingMode::Configuration);

        let config = BusConfig {
            node_address: 0x7FF,
            ..BusConfig::loopback()
        };
        setup(&mut ctrl, &config, &ctx, &mut rx_ring, &mut tx_queue).unwrap();
        assert_eq!(ctx.node_address(), 0x7FF);
    }
}
