//! Reusable byte buffers for the write path.
//!
//! A single write transaction may encode thousands of keys and values. The
//! engine copies every key and value on `put`, so a buffer is only needed
//! for the duration of one call. [`ByteBufferArena`] keeps a bounded pool of
//! cleared buffers and hands them out as [`PooledBuffer`] guards that return
//! themselves to the pool on drop.
//!
//! The pool is a lock-free [`ArrayQueue`], so one arena can be shared by
//! every reader and the single writer of an environment.


use std::fmt;
use std::ops::{Deref, DerefMut};

use crossbeam::queue::ArrayQueue;

/// Default capacity of each pooled buffer (bytes).
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Default number of idle buffers retained by the pool.
pub const DEFAULT_POOLED_BUFFERS: usize = 16;

/// A bounded pool of fixed-capacity byte buffers.
pub struct ByteBufferArena {
    pool: ArrayQueue<Vec<u8>>,
    capacity: usize,
}

impl fmt::Debug for ByteBufferArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBufferArena")
            .field("capacity", &self.capacity)
            .field("idle", &self.pool.len())
            .finish()
    }
}

impl Default for ByteBufferArena {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_POOLED_BUFFERS)
    }
}

impl ByteBufferArena {
    /// Creates an arena whose buffers start with `capacity` bytes and which
    /// keeps at most `max_idle` returned buffers.
    pub fn new(capacity: usize, max_idle: usize) -> Self {
        Self {
            pool: ArrayQueue::new(max_idle.max(1)),
            capacity,
        }
    }

    /// Capacity a fresh buffer is allocated with.
    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffers currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.pool.len()
    }

    /// Takes an empty buffer from the pool, allocating if none is idle.
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let buf = self
            .pool
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.capacity));
        PooledBuffer { arena: self, buf }
    }

    /// Runs `f` with an empty pooled buffer and returns its result.
    ///
    /// The buffer goes back to the pool when `f` returns; nothing written to
    /// it survives the call.
    pub fn with_buffer<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        let mut buf = self.acquire();
        f(&mut buf)
    }

    fn release(&self, mut buf: Vec<u8>) {
        // Buffers that grew far past the nominal capacity are not kept.
        if buf.capacity() > self.capacity.saturating_mul(4) {
            return;
        }
        buf.clear();
        // A full pool drops the buffer.
        let _ = self.pool.push(buf);
    }
}

/// A buffer borrowed from a [`ByteBufferArena`].
///
/// Dereferences to `Vec<u8>`; it is cleared and returned to the pool on
/// drop.
pub struct PooledBuffer<'a> {
    arena: &'a ByteBufferArena,
    buf: Vec<u8>,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.arena.release(std::mem::take(&mut self.buf));
    }
}
