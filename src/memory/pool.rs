//! # Chunk Pool
//!
//! Pre-allocated pool of fixed-size byte chunks shared by the transaction
//! chunk store (analyser thread) and the output buffer (analyser produces,
//! writer releases). Releasing returns buffers for reuse instead of freeing,
//! so steady-state operation performs no heap traffic.
//!
//! ## Thread Safety
//!
//! `MemoryPool` is `Send + Sync`; the free list sits behind a
//! `parking_lot::Mutex` and the allocation counter is atomic so accounting
//! reads never take the lock.

use eyre::{bail, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{DEFAULT_POOL_MAX_CHUNKS, DEFAULT_POOL_MIN_CHUNKS, MEMORY_CHUNK_SIZE};

/// One pool chunk.
pub type MemChunk = Box<[u8; MEMORY_CHUNK_SIZE]>;

/// A bounded pool of reusable chunks.
pub struct MemoryPool {
    free: Mutex<Vec<MemChunk>>,
    /// Chunks currently handed out plus chunks sitting on the free list.
    allocated: AtomicUsize,
    max_chunks: usize,
}

impl MemoryPool {
    /// Create a pool with `min_chunks` pre-allocated and a hard ceiling of
    /// `max_chunks` live chunks.
    pub fn new(min_chunks: usize, max_chunks: usize) -> Self {
        let mut free = Vec::with_capacity(min_chunks);
        for _ in 0..min_chunks {
            free.push(new_chunk());
        }
        Self {
            free: Mutex::new(free),
            allocated: AtomicUsize::new(min_chunks),
            max_chunks,
        }
    }

    /// Acquire a zeroed chunk, reusing a freed one when available. `owner`
    /// names the requesting subsystem for the failure diagnostic.
    pub fn acquire(&self, owner: &'static str) -> Result<MemChunk> {
        if let Some(mut chunk) = self.free.lock().pop() {
            chunk.fill(0);
            return Ok(chunk);
        }

        let prev = self.allocated.fetch_add(1, Ordering::SeqCst);
        if prev >= self.max_chunks {
            self.allocated.fetch_sub(1, Ordering::SeqCst);
            bail!(
                "could not allocate {} bytes memory for: {} (limit of {} chunks reached)",
                MEMORY_CHUNK_SIZE,
                owner,
                self.max_chunks
            );
        }
        Ok(new_chunk())
    }

    /// Return a chunk to the free list.
    pub fn release(&self, chunk: MemChunk) {
        self.free.lock().push(chunk);
    }

    /// Total live chunks (handed out + free).
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Chunks currently available without allocating.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_MIN_CHUNKS, DEFAULT_POOL_MAX_CHUNKS)
    }
}

fn new_chunk() -> MemChunk {
    // Box::new([0; N]) would build the array on the stack first.
    vec![0u8; MEMORY_CHUNK_SIZE]
        .into_boxed_slice()
        .try_into()
        .expect("chunk allocation size mismatch")
}
