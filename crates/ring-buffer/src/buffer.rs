//! Lock-Free Ring Buffer Implementation

use crate::error::{BufferEmpty, BufferFull};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed-capacity SPSC ring buffer
///
/// `pushed` and `popped` run modulo `2 * N`, so `pending()` can tell a full
/// buffer from an empty one without a separate flag.
pub struct RingBuffer<T, const N: usize> {
    /// Pre-allocated storage
    storage: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Items written so far (mod 2N)
    pushed: AtomicUsize,
    /// Items read so far (mod 2N)
    popped: AtomicUsize,
}

impl<T, const N: usize> RingBuffer<T, N> {
    const VALID_CAPACITY: () = assert!(
        N > 0 && N <= usize::MAX / 2,
        "ring buffer capacity must be in 1..=usize::MAX / 2"
    );

    /// Counters wrap at twice the capacity
    const WRAP: usize = 2 * N;

    /// Create an empty ring buffer
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_CAPACITY;

        let storage: Vec<UnsafeCell<MaybeUninit<T>>> =
            (0..N).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();
        Self {
            storage: storage.into_boxed_slice(),
            pushed: AtomicUsize::new(0),
            popped: AtomicUsize::new(0),
        }
    }

    /// Get the buffer capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of items currently queued
    pub fn pending(&self) -> usize {
        occupancy::<N>(
            self.pushed.load(Ordering::SeqCst),
            self.popped.load(Ordering::SeqCst),
        )
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.pending() == N
    }

    /// Append an item, handing it back if the buffer is full
    pub fn push(&mut self, item: T) -> Result<(), BufferFull<T>> {
        // SAFETY: `&mut self` makes this the only producer.
        unsafe { self.push_shared(item) }
    }

    /// Remove the oldest item
    pub fn pop(&mut self) -> Result<T, BufferEmpty> {
        // SAFETY: `&mut self` makes this the only consumer.
        unsafe { self.pop_shared() }
    }

    /// Borrow the oldest item without removing it
    pub fn peek(&self) -> Result<&T, BufferEmpty> {
        // SAFETY: a shared borrow of the whole buffer rules out a concurrent
        // `pop` through `&mut self`, and handles from `split` borrow mutably.
        unsafe { self.peek_shared() }
    }

    /// Drop every queued item and reset both counters
    pub fn clear(&mut self) {
        while self.pop().is_ok() {}
        self.pushed.store(0, Ordering::SeqCst);
        self.popped.store(0, Ordering::SeqCst);
    }

    /// Split into the single producer and single consumer handles
    ///
    /// The handles may live in different execution contexts (for example an
    /// interrupt handler and the main loop). Borrowing `self` mutably
    /// guarantees no other handle exists while they are alive.
    pub fn split(&mut self) -> (Producer<'_, T, N>, Consumer<'_, T, N>) {
        let ring: &Self = self;
        (Producer { ring }, Consumer { ring })
    }

    /// # Safety
    /// At most one thread may be pushing at a time.
    unsafe fn push_shared(&self, item: T) -> Result<(), BufferFull<T>> {
        let pushed = self.pushed.load(Ordering::SeqCst);
        let popped = self.popped.load(Ordering::SeqCst);

        if occupancy::<N>(pushed, popped) == N {
            return Err(BufferFull(item));
        }

        // SAFETY: the slot is outside the occupied range, so the consumer is
        // not reading it and it holds no initialized value.
        unsafe {
            (*self.storage[pushed % N].get()).write(item);
        }

        self.pushed.store((pushed + 1) % Self::WRAP, Ordering::SeqCst);
        Ok(())
    }

    /// # Safety
    /// At most one thread may be popping or peeking at a time.
    unsafe fn pop_shared(&self) -> Result<T, BufferEmpty> {
        let popped = self.popped.load(Ordering::SeqCst);
        let pushed = self.pushed.load(Ordering::SeqCst);

        if occupancy::<N>(pushed, popped) == 0 {
            return Err(BufferEmpty);
        }

        // SAFETY: the slot is inside the occupied range, so the producer
        // finished writing it and will not touch it until `popped` advances.
        let item = unsafe { (*self.storage[popped % N].get()).assume_init_read() };

        self.popped.store((popped + 1) % Self::WRAP, Ordering::SeqCst);
        Ok(item)
    }

    /// # Safety
    /// No concurrent `pop_shared` may run while the returned borrow is alive.
    unsafe fn peek_shared(&self) -> Result<&T, BufferEmpty> {
        let popped = self.popped.load(Ordering::SeqCst);
        let pushed = self.pushed.load(Ordering::SeqCst);

        if occupancy::<N>(pushed, popped) == 0 {
            return Err(BufferEmpty);
        }

        // SAFETY: occupied slot, see `pop_shared`.
        Ok(unsafe { (*self.storage[popped % N].get()).assume_init_ref() })
    }

    #[cfg(test)]
    pub(crate) fn counters(&self) -> (usize, usize) {
        (
            self.pushed.load(Ordering::SeqCst),
            self.popped.load(Ordering::SeqCst),
        )
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for RingBuffer<T, N> {
    fn drop(&mut self) {
        while self.pop().is_ok() {}
    }
}

impl<T, const N: usize> std::fmt::Debug for RingBuffer<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &N)
            .field("pending", &self.pending())
            .finish()
    }
}

// SAFETY: the buffer owns its items. Shared access only hands out `&T`
// (`peek`), and every slot is touched by at most one side at a time.
unsafe impl<T: Send, const N: usize> Send for RingBuffer<T, N> {}
unsafe impl<T: Send + Sync, const N: usize> Sync for RingBuffer<T, N> {}

/// `(pushed - popped) mod 2N`
fn occupancy<const N: usize>(pushed: usize, popped: usize) -> usize {
    if pushed >= popped {
        pushed - popped
    } else {
        pushed + 2 * N - popped
    }
}

/// Write half of a split ring buffer
pub struct Producer<'a, T, const N: usize> {
    ring: &'a RingBuffer<T, N>,
}

impl<T, const N: usize> Producer<'_, T, N> {
    /// Append an item, handing it back if the buffer is full
    pub fn push(&mut self, item: T) -> Result<(), BufferFull<T>> {
        // SAFETY: `split` hands out exactly one producer and `&mut self`
        // serializes its use.
        unsafe { self.ring.push_shared(item) }
    }

    /// Number of items currently queued
    pub fn pending(&self) -> usize {
        self.ring.pending()
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        N
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }
}

/// Read half of a split ring buffer
pub struct Consumer<'a, T, const N: usize> {
    ring: &'a RingBuffer<T, N>,
}

impl<T, const N: usize> Consumer<'_, T, N> {
    /// Remove the oldest item
    pub fn pop(&mut self) -> Result<T, BufferEmpty> {
        // SAFETY: `split` hands out exactly one consumer and `&mut self`
        // serializes its use.
        unsafe { self.ring.pop_shared() }
    }

    /// Borrow the oldest item without removing it
    pub fn peek(&self) -> Result<&T, BufferEmpty> {
        // SAFETY: the borrow ties up `self`, so `pop` cannot run meanwhile.
        unsafe { self.ring.peek_shared() }
    }

    /// Number of items currently queued
    pub fn pending(&self) -> usize {
        self.ring.pending()
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        N
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

// SAFETY: each handle is unique for its side; items only move out of the
// buffer by value through the consumer, so `T: Send` is enough.
unsafe impl<T: Send, const N: usize> Send for Producer<'_, T, N> {}
unsafe impl<T: Send, const N: usize> Send for Consumer<'_, T, N> {}
