//! CAN Peripheral Error Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result code reported by the CAN peripheral driver
///
/// Stored verbatim in received frames so the consumer can report it later.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[default]
    Ok = 0,
    RxEmpty = 1,
    TxFull = 2,
    NotTx = 3,
    IsRtr = 4,
    NoRtr = 5,
    BaudNotDivisible = 6,
    BaudInvalid = 7,
}

impl ErrorCode {
    /// Numeric code as the driver reports it
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }

    /// Convert into a `Result`, mapping every non-OK code to its error
    pub fn into_result(self) -> Result<(), PeripheralError> {
        match self {
            ErrorCode::Ok => Ok(()),
            ErrorCode::RxEmpty => Err(PeripheralError::RxEmpty),
            ErrorCode::TxFull => Err(PeripheralError::TxFull),
            ErrorCode::NotTx => Err(PeripheralError::NotTx),
            ErrorCode::IsRtr => Err(PeripheralError::IsRtr),
            ErrorCode::NoRtr => Err(PeripheralError::NoRtr),
            ErrorCode::BaudNotDivisible => Err(PeripheralError::BaudNotDivisible),
            ErrorCode::BaudInvalid => Err(PeripheralError::BaudInvalid),
        }
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Ok),
            1 => Ok(Self::RxEmpty),
            2 => Ok(Self::TxFull),
            3 => Ok(Self::NotTx),
            4 => Ok(Self::IsRtr),
            5 => Ok(Self::NoRtr),
            6 => Ok(Self::BaudNotDivisible),
            7 => Ok(Self::BaudInvalid),
            other => Err(other),
        }
    }
}

impl From<Result<(), PeripheralError>> for ErrorCode {
    fn from(result: Result<(), PeripheralError>) -> Self {
        match result {
            Ok(()) => ErrorCode::Ok,
            Err(e) => e.code(),
        }
    }
}

/// Errors returned by the CAN peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PeripheralError {
    /// All RX buffers are empty, or the selected one is
    #[error("receive buffer empty")]
    RxEmpty,

    /// All TX buffers are full, or the selected one is
    #[error("transmit buffer full")]
    TxFull,

    /// Selected buffer is not configured for transmit
    #[error("buffer is not a transmit buffer")]
    NotTx,

    /// Selected buffer is reserved for remote transmission requests
    #[error("buffer is set up as an RTR buffer")]
    IsRtr,

    /// Buffer cannot answer remote transmission requests
    #[error("buffer cannot respond to RTR requests")]
    NoRtr,

    /// CAN clock is not evenly divisible by the requested bit rate
    #[error("clock not divisible by bit rate")]
    BaudNotDivisible,

    /// Requested bit rate is not achievable
    #[error("bit rate not achievable")]
    BaudInvalid,
}

impl PeripheralError {
    /// Driver result code for this error
    pub fn code(self) -> ErrorCode {
        match self {
            PeripheralError::RxEmpty => ErrorCode::RxEmpty,
            PeripheralError::TxFull => ErrorCode::TxFull,
            PeripheralError::NotTx => ErrorCode::NotTx,
            PeripheralError::IsRtr => ErrorCode::IsRtr,
            PeripheralError::NoRtr => ErrorCode::NoRtr,
            PeripheralError::BaudNotDivisible => ErrorCode::BaudNotDivisible,
            PeripheralError::BaudInvalid => ErrorCode::BaudInvalid,
        }
    }
}

impl From<PeripheralError> for ErrorCode {
    fn from(err: PeripheralError) -> Self {
        err.code()
    }
}
