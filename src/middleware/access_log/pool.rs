//! Reusable line buffers.

use std::ops::{Deref, DerefMut};

use crossbeam::queue::ArrayQueue;

/// Initial capacity of freshly allocated buffers. Fits a typical access-log
/// line without regrowing.
const BUFFER_CAPACITY: usize = 256;

/// Buffers that grew past this are dropped instead of pooled, so one huge
/// error body does not pin its allocation for the life of the process.
const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// A bounded, lock-free pool of byte buffers.
///
/// [`get`](BufferPool::get) never waits: when every pooled buffer is checked
/// out it allocates a new one. Returning a buffer to a full pool drops it.
pub struct BufferPool {
    idle: ArrayQueue<Vec<u8>>,
}

impl BufferPool {
    /// A pool that keeps at most `capacity` idle buffers (at least one).
    pub fn new(capacity: usize) -> Self {
        Self { idle: ArrayQueue::new(capacity.max(1)) }
    }

    /// Checks out an empty buffer. It goes back to the pool when the guard
    /// drops.
    pub fn get(&self) -> PooledBuf<'_> {
        let buf = self.idle.pop().unwrap_or_else(|| Vec::with_capacity(BUFFER_CAPACITY));
        PooledBuf { pool: self, buf }
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }

    fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();
        // Full pool: let the buffer go.
        let _ = self.idle.push(buf);
    }
}

/// A buffer checked out of a [`BufferPool`], owned by one request.
pub struct PooledBuf<'p> {
    pool: &'p BufferPool,
    buf: Vec<u8>,
}

impl Deref for PooledBuf<'_> {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> { &self.buf }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> { &mut self.buf }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf));
    }
}
