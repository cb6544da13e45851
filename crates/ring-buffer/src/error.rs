//! Ring Buffer Error Types

use thiserror::Error;

/// Push rejected because every slot is occupied
///
/// Carries the rejected item so the caller decides whether to drop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ring buffer is full")]
pub struct BufferFull<T>(pub T);

impl<T> BufferFull<T> {
    /// Recover the item that could not be queued
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Pop or peek on a buffer with nothing queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ring buffer is empty")]
pub struct BufferEmpty;
