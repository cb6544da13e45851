//! Lock-Free Ring Buffer
//!
//! Fixed-capacity single-producer/single-consumer queue. The producer and
//! consumer may run in different execution contexts (an interrupt handler
//! and the main loop) once the buffer has been [`split`](RingBuffer::split).

mod buffer;
mod error;

pub use buffer::{Consumer, Producer, RingBuffer};
pub use error::{BufferEmpty, BufferFull};
