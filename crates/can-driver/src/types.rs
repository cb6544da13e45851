//! Peripheral-level message headers and selectors

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Maximum payload of a classic CAN frame
pub const MAX_PAYLOAD: usize = 8;

/// Largest 11-bit standard identifier
pub const STANDARD_ID_MAX: u32 = 0x7FF;

/// Largest 29-bit extended identifier
pub const EXTENDED_ID_MAX: u32 = 0x1FFF_FFFF;

/// Header handed to the transmit primitive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHeader {
    /// Identifier to send with
    pub id: u32,
    /// Number of payload bytes to send
    pub length: u8,
    /// Send with a 29-bit identifier
    pub extended: bool,
    /// Send as a remote transmission request
    pub remote_request: bool,
    /// 0-3, higher is sent sooner
    pub priority: u8,
}

/// Header produced by the receive primitive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxHeader {
    /// Identifier of the received message
    pub id: u32,
    /// Number of payload bytes received
    pub length: u8,
    /// Acceptance filter that matched
    pub filter: u8,
    /// Hardware buffer the message was read from
    pub buffer: u8,
    /// Hardware buffer overflowed before this read
    pub overflow: bool,
    pub extended: bool,
    pub remote_request: bool,
}

impl From<TxHeader> for RxHeader {
    /// Header as seen by a node receiving this transmission
    fn from(tx: TxHeader) -> Self {
        Self {
            id: tx.id,
            length: tx.length,
            filter: 0,
            buffer: 0,
            overflow: false,
            extended: tx.extended,
            remote_request: tx.remote_request,
        }
    }
}

/// Hardware buffer to address in a peripheral call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferSelector {
    /// First free transmit buffer
    #[default]
    AnyTx,
    /// Any receive buffer holding a message
    AnyRx,
    /// The receive FIFO
    Fifo,
    /// A specific numbered buffer (0-31)
    Buffer(u8),
}

/// Controller operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    Normal,
    Disable,
    /// Transmitted frames are received back internally
    Loopback,
    ListenOnly,
    Configuration,
    ListenAll,
}

bitflags! {
    /// Controller interrupt sources
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Interrupts: u8 {
        /// TX buffer
        const TX = 0x01;
        /// RX buffer
        const RX = 0x02;
        /// RX buffer overflow
        const RX_OVERFLOW = 0x04;
        /// FIFO almost full
        const FIFO_ALMOST_FULL = 0x08;
        const ERROR = 0x20;
        /// Bus wake-up activity
        const WAKE = 0x40;
        const INVALID_MESSAGE = 0x80;
    }
}

/// Acceptance filter setting, passed through to the driver untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub index: u8,
    pub id: u32,
    pub extended: bool,
    /// Buffer that receives matching messages
    pub target: BufferSelector,
    /// Mask register paired with this filter
    pub mask: u8,
}

/// Acceptance mask setting, passed through to the driver untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskConfig {
    pub index: u8,
    pub id: u32,
    pub extended: bool,
}
