//! Reusable body buffers.
//!
//! # Responsibilities
//! - Recycle byte buffers used to stream request/response bodies
//! - Keep buffer memory alive across requests; free only at pool teardown
//!
//! # Design Decisions
//! - Free list is per worker, so no synchronization
//! - LIFO reuse keeps the hottest buffer at the top of the list

use std::ops::{Deref, DerefMut};

use bytes::BytesMut;

/// Minimum capacity of a freshly allocated chunk. Small hints still get a
/// buffer worth recycling.
const MIN_CHUNK_CAPACITY: usize = 4096;

/// A reusable buffer for streamed body bytes.
#[derive(Debug)]
pub struct Chunk {
    buf: BytesMut,
}

impl Chunk {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }
}

impl Deref for Chunk {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for Chunk {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

/// Per-worker pool of reusable chunks.
#[derive(Debug, Default)]
pub struct ChunkBufferPool {
    free: Vec<Chunk>,
}

impl ChunkBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer of at least `size_hint` bytes: the most recently released
    /// chunk when it fits, freshly allocated otherwise. O(1): only the top
    /// of the free list is probed.
    pub fn acquire(&mut self, size_hint: usize) -> Chunk {
        if self
            .free
            .last()
            .map_or(false, |c| c.capacity() >= size_hint)
        {
            if let Some(chunk) = self.free.pop() {
                return chunk;
            }
        }
        Chunk::with_capacity(size_hint.max(MIN_CHUNK_CAPACITY))
    }

    /// Return a chunk to the free list. The memory stays allocated.
    pub fn release(&mut self, mut chunk: Chunk) {
        chunk.buf.clear();
        self.free.push(chunk);
    }

    /// Number of idle chunks available for reuse.
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Drop every pooled buffer's memory. Context teardown only.
    pub fn free_all(&mut self) {
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse_preserves_identity() {
        let mut pool = ChunkBufferPool::new();

        let chunk = pool.acquire(1024);
        let ptr = chunk.as_ptr();
        pool.release(chunk);

        let again = pool.acquire(512);
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_small_hint_rounds_up() {
        let mut pool = ChunkBufferPool::new();
        let chunk = pool.acquire(16);
        assert!(chunk.capacity() >= MIN_CHUNK_CAPACITY);
    }

    #[test]
    fn test_oversized_hint_allocates_fresh() {
        let mut pool = ChunkBufferPool::new();
        let small = pool.acquire(1024);
        pool.release(small);

        let big = pool.acquire(1 << 20);
        assert!(big.capacity() >= 1 << 20);
        // The small chunk stays pooled for the next fitting request.
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_acquire_probes_only_newest() {
        let mut pool = ChunkBufferPool::new();

        let big = pool.acquire(1 << 16);
        let small = pool.acquire(64);
        pool.release(big);
        pool.release(small); // small is now on top

        // A big request misses the top chunk and allocates fresh rather
        // than scanning deeper.
        let fresh = pool.acquire(1 << 16);
        assert!(fresh.capacity() >= 1 << 16);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_release_clears_contents() {
        use bytes::BufMut;

        let mut pool = ChunkBufferPool::new();
        let mut chunk = pool.acquire(64);
        chunk.put_slice(b"body bytes");
        pool.release(chunk);

        let again = pool.acquire(64);
        assert!(again.is_empty());
    }

    #[test]
    fn test_free_all_empties_pool() {
        let mut pool = ChunkBufferPool::new();
        for _ in 0..4 {
            let c = pool.acquire(128);
            pool.release(c);
        }
        assert_eq!(pool.idle(), 1); // same buffer cycled
        pool.free_all();
        assert_eq!(pool.idle(), 0);
    }
}
