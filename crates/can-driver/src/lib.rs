//! CAN Peripheral Driver Surface
//!
//! Types and traits through which the frame queues talk to a CAN
//! controller, plus an in-memory [`SimulatedController`] used on hosts
//! without CAN hardware.

mod error;
mod peripheral;
mod sim;
mod types;

pub use error::{ErrorCode, PeripheralError};
pub use peripheral::{CanControl, CanPeripheral, CanReceive, CanTransmit, InterruptHandler};
pub use sim::{
    InterruptThread, RawFrame, SimulatedController, DEFAULT_FIFO_DEPTH, MAX_BITRATE,
    TX_BUFFER_COUNT,
};
pub use types::{
    BufferSelector, FilterConfig, Interrupts, MaskConfig, OperatingMode, RxHeader, TxHeader,
    EXTENDED_ID_MAX, MAX_PAYLOAD, STANDARD_ID_MAX,
};
