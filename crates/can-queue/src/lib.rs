//! Interrupt-Safe CAN Frame Queues
//!
//! Buffers frames between the controller's receive interrupt and the main
//! loop, and between application producers and the polled transmit path.
//!
//! ```text
//! receive interrupt -> RxIngest -> RX ring -> Diagnostics / consumer
//! application -> TxFrame::pack -> TxQueue -> drain -> controller
//! ```

mod bus;
mod context;
mod diagnostics;
mod error;
mod frame;
mod rx;
mod tx;

pub use bus::{setup, BusConfig, RxRing, TxRing, RX_CAPACITY, TX_CAPACITY};
pub use context::{CanContext, CanStats, DEFAULT_NODE_ADDRESS};
pub use diagnostics::{Clock, Diagnostics, HexBytes, MonotonicClock};
pub use error::CanError;
pub use frame::{RxFrame, TxFrame, MAX_PRIORITY};
pub use rx::{RxIngest, RxOutcome};
pub use tx::{DrainOutcome, DrainReport, TxQueue};
