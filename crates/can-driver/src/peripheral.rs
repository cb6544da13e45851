//! Abstract CAN peripheral surface
//!
//! The controller is split along the execution contexts that use it:
//! [`CanReceive`] is driven from the receive interrupt, [`CanTransmit`] from
//! the main loop, and [`CanControl`] during setup.

use crate::error::PeripheralError;
use crate::types::{
    BufferSelector, FilterConfig, Interrupts, MaskConfig, OperatingMode, RxHeader, TxHeader,
    MAX_PAYLOAD,
};

/// Controller setup and interrupt management
pub trait CanControl {
    /// Initialize the controller and enter `mode`
    fn init(&mut self, mode: OperatingMode);

    /// Set the bit rate from the CAN clock presented to the controller
    fn set_baud(&mut self, clock_hz: u32, rate: u32) -> Result<(), PeripheralError>;

    fn configure_filter(&mut self, filter: FilterConfig);

    fn configure_mask(&mut self, mask: MaskConfig);

    fn enable_interrupt(&mut self, kind: Interrupts);

    fn disable_interrupt(&mut self, kind: Interrupts);

    /// Interrupt sources currently flagged
    fn active_interrupts(&self) -> Interrupts;
}

/// Transmit primitives
pub trait CanTransmit {
    /// Load one message into a hardware transmit buffer
    fn transmit(
        &mut self,
        header: &TxHeader,
        payload: &[u8; MAX_PAYLOAD],
        buffer: BufferSelector,
    ) -> Result<(), PeripheralError>;

    /// Whether `buffer` can accept a new message
    fn tx_buffer_free(&self, buffer: BufferSelector) -> bool;

    /// Abort pending transmissions in `buffer`
    fn abort(&mut self, buffer: BufferSelector);
}

/// Receive primitives
pub trait CanReceive {
    /// Whether at least one message waits in `buffer`
    fn has_pending(&self, buffer: BufferSelector) -> bool;

    /// Read one message out of `buffer`
    fn receive(
        &mut self,
        buffer: BufferSelector,
    ) -> Result<(RxHeader, [u8; MAX_PAYLOAD]), PeripheralError>;
}

/// A complete CAN controller
pub trait CanPeripheral: CanControl + CanTransmit + CanReceive {}

impl<T: CanControl + CanTransmit + CanReceive> CanPeripheral for T {}

/// Callback run by the runtime when the controller raises an interrupt
///
/// Implementations execute in interrupt context: they must finish in bounded
/// time, never block, and never format or log.
pub trait InterruptHandler {
    fn on_interrupt(&mut self, active: Interrupts);
}

impl<F: FnMut(Interrupts)> InterruptHandler for F {
    fn on_interrupt(&mut self, active: Interrupts) {
        self(active)
    }
}

impl<T: CanControl + ?Sized> CanControl for &mut T {
    fn init(&mut self, mode: OperatingMode) {
        (**self).init(mode)
    }

    fn set_baud(&mut self, clock_hz: u32, rate: u32) -> Result<(), PeripheralError> {
        (**self).set_baud(clock_hz, rate)
    }

    fn configure_filter(&mut self, filter: FilterConfig) {
        (**self).configure_filter(filter)
    }

    fn configure_mask(&mut self, mask: MaskConfig) {
        (**self).configure_mask(mask)
    }

    fn enable_interrupt(&mut self, kind: Interrupts) {
        (**self).enable_interrupt(kind)
    }

    fn disable_interrupt(&mut self, kind: Interrupts) {
        (**self).disable_interrupt(kind)
    }

    fn active_interrupts(&self) -> Interrupts {
        (**self).active_interrupts()
    }
}

impl<T: CanTransmit + ?Sized> CanTransmit for &mut T {
    fn transmit(
        &mut self,
        header: &TxHeader,
        payload: &[u8; MAX_PAYLOAD],
        buffer: BufferSelector,
    ) -> Result<(), PeripheralError> {
        (**self).transmit(header, payload, buffer)
    }

    fn tx_buffer_free(&self, buffer: BufferSelector) -> bool {
        (**self).tx_buffer_free(buffer)
    }

    fn abort(&mut self, buffer: BufferSelector) {
        (**self).abort(buffer)
    }
}

impl<T: CanReceive + ?Sized> CanReceive for &mut T {
    fn has_pending(&self, buffer: BufferSelector) -> bool {
        (**self).has_pending(buffer)
    }

    fn receive(
        &mut self,
        buffer: BufferSelector,
    ) -> Result<(RxHeader, [u8; MAX_PAYLOAD]), PeripheralError> {
        (**self).receive(buffer)
    }
}
