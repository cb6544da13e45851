//! Canonical RX and TX frame records

use crate::error::CanError;
use can_driver::{
    ErrorCode, PeripheralError, RxHeader, TxHeader, EXTENDED_ID_MAX, MAX_PAYLOAD,
    STANDARD_ID_MAX,
};
use serde::{Deserialize, Serialize};

/// Highest transmit priority accepted by the controller
pub const MAX_PRIORITY: u8 = 3;

/// Frame received from the bus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxFrame {
    pub id: u32,
    pub extended: bool,
    pub remote_request: bool,
    /// Valid payload bytes, never more than 8
    pub length: u8,
    pub payload: [u8; MAX_PAYLOAD],
    /// Acceptance filter that matched
    pub source_filter: u8,
    /// Hardware buffer the frame was read from
    pub source_buffer: u8,
    /// Hardware receive buffer overflowed before this frame
    pub overflow: bool,
    /// Driver result of the read, reported later by the consumer
    pub error: ErrorCode,
    pub sequence: u32,
}

impl RxFrame {
    /// Build a frame from a hardware read
    ///
    /// Header fields are copied by value and exactly `length` payload bytes
    /// are kept; the rest of the payload is zeroed.
    pub fn unpack(header: &RxHeader, payload: &[u8; MAX_PAYLOAD]) -> Self {
        let length = header.length.min(MAX_PAYLOAD as u8);
        let mut data = [0u8; MAX_PAYLOAD];
        data[..length as usize].copy_from_slice(&payload[..length as usize]);

        Self {
            id: header.id,
            extended: header.extended,
            remote_request: header.remote_request,
            length,
            payload: data,
            source_filter: header.filter,
            source_buffer: header.buffer,
            overflow: header.overflow,
            error: ErrorCode::Ok,
            sequence: 0,
        }
    }

    /// Placeholder for a read the driver could not complete
    pub fn failed(error: PeripheralError) -> Self {
        Self {
            error: error.code(),
            ..Default::default()
        }
    }

    /// Valid payload bytes
    pub fn data(&self) -> &[u8] {
        &self.payload[..(self.length as usize).min(MAX_PAYLOAD)]
    }
}

/// Frame waiting to be sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxFrame {
    pub id: u32,
    pub extended: bool,
    pub remote_request: bool,
    /// 0-3, higher is sent sooner
    pub priority: u8,
    /// Valid payload bytes, never more than 8
    pub length: u8,
    pub payload: [u8; MAX_PAYLOAD],
    /// Transmit result, set when the drain fails to send this frame
    pub error: ErrorCode,
    /// Assigned when the frame is queued
    pub sequence: u32,
}

impl TxFrame {
    /// Build a standard-identifier data frame addressed to `destination_id`
    ///
    /// The payload is copied verbatim and `length` is its size in bytes.
    /// Payloads longer than 8 bytes are rejected rather than truncated.
    pub fn pack(destination_id: u32, payload: &[u8]) -> Result<Self, CanError> {
        Self::build(destination_id, false, payload)
    }

    /// Build a 29-bit identifier data frame
    pub fn pack_extended(destination_id: u32, payload: &[u8]) -> Result<Self, CanError> {
        Self::build(destination_id, true, payload)
    }

    fn build(id: u32, extended: bool, payload: &[u8]) -> Result<Self, CanError> {
        let limit = if extended {
            EXTENDED_ID_MAX
        } else {
            STANDARD_ID_MAX
        };
        if id > limit {
            return Err(CanError::InvalidIdentifier { id, extended });
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(CanError::PayloadTooLong(payload.len()));
        }

        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);

        Ok(Self {
            id,
            extended,
            length: payload.len() as u8,
            payload: data,
            ..Default::default()
        })
    }

    /// Set the transmit priority, clamped to 0-3
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(MAX_PRIORITY);
        self
    }

    /// Header handed to the transmit primitive
    pub fn header(&self) -> TxHeader {
        TxHeader {
            id: self.id,
            length: self.length.min(MAX_PAYLOAD as u8),
            extended: self.extended,
            remote_request: self.remote_request,
            priority: self.priority.min(MAX_PRIORITY),
        }
    }

    /// Valid payload bytes
    pub fn data(&self) -> &[u8] {
        &self.payload[..(self.length as usize).min(MAX_PAYLOAD)]
    }
}
