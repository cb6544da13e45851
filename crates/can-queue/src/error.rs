//! CAN Queue Error Types

use can_driver::PeripheralError;
use thiserror::Error;

/// Errors raised by the frame queues and diagnostics
#[derive(Debug, Error)]
pub enum CanError {
    /// TX ring rejected the frame; it was not queued
    #[error("TX buffer is full, msg num[{sequence}] not queued")]
    TxBufferFull { sequence: u32 },

    /// Payload does not fit a classic CAN frame
    #[error("payload of {0} bytes exceeds the 8 byte frame limit")]
    PayloadTooLong(usize),

    /// Identifier does not fit the requested identifier width
    #[error("identifier {id:#X} out of range (extended: {extended})")]
    InvalidIdentifier { id: u32, extended: bool },

    /// Controller reported an error
    #[error("CAN peripheral error: {0}")]
    Peripheral(#[from] PeripheralError),

    /// Writing to the diagnostics stream failed
    #[error("diagnostics output failed: {0}")]
    Io(#[from] std::io::Error),
}
