//! # Output Buffer
//!
//! Chunked FIFO of framed messages between the analyser (producer) and the
//! writer thread (consumer). Chunks come from the shared memory pool and are
//! returned to it as the writer drains them, so an arbitrarily large
//! transaction streams through bounded memory.
//!
//! ## Message Framing
//!
//! ```text
//! [ u64 length ] [ payload bytes ] [ pad to 8-byte boundary ]
//! ```
//!
//! `begin_message` reserves the zeroed length prefix and snapshots the patch
//! point; `commit_message` pads, patches the prefix with the final payload
//! length, publishes, and signals the writer. A zero prefix therefore means
//! "message in flight" to the reader. A committed zero-length message would
//! be indistinguishable from an in-flight reservation, so its prefix is
//! patched with [`EMPTY_MESSAGE_PREFIX`] instead; the reader skips that
//! marker in place without delivering anything.
//!
//! ## Handover Protocol
//!
//! The mutex guards only the handover state: the chunk queue, each chunk's
//! published END cursor, the consumer position, and the allocation counter.
//! Payload bytes are written by the producer outside the lock, into space
//! beyond every published END; the consumer never reads past an END, and END
//! updates happen inside the critical section, ordering the two sides.
//!
//! Chunk positions stay 8-aligned (messages are padded, chunks are a
//! multiple of 8), so a length prefix never straddles a chunk boundary.
//!
//! ## Character Sets
//!
//! The buffer also carries the immutable character-set dictionary consulted
//! by formatters; `set_nls_charset` resolves the configured defaults by
//! Oracle name and fails the session on an unsupported name.

use eyre::Result;
use parking_lot::{Condvar, Mutex};
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

use super::charset::CharsetRegistry;
use crate::config::{align8, MEMORY_CHUNK_SIZE, MESSAGE_LENGTH_SIZE};
use crate::memory::{MemChunk, MemoryPool};

/// Prefix marking a committed zero-length message. A real payload can never
/// reach this length, and the value is distinct from the zero written by
/// `begin_message`, so the reader can skip the slot instead of treating it
/// as in flight.
const EMPTY_MESSAGE_PREFIX: u64 = u64::MAX;

/// One queue link: a pool chunk plus its published END cursor.
struct OutputChunk {
    buffer: UnsafeCell<MemChunk>,
    /// Cached base pointer of the heap array; taken while the chunk was
    /// exclusively owned, before any sharing.
    base: *mut u8,
    /// Bytes visible to the consumer. Mutated only while holding the
    /// handover mutex.
    end: AtomicUsize,
}

// SAFETY: the producer writes only at offsets >= every value `end` has held,
// the consumer reads only below `end`, and `end` changes exclusively inside
// the handover critical section, which orders the two sides. The raw base
// pointer is derived from a heap allocation owned by `buffer` and outlives
// all uses.
unsafe impl Send for OutputChunk {}
unsafe impl Sync for OutputChunk {}

impl OutputChunk {
    fn new(mut buffer: MemChunk) -> Arc<Self> {
        let base = buffer.as_mut_ptr();
        Arc::new(Self {
            buffer: UnsafeCell::new(buffer),
            base,
            end: AtomicUsize::new(0),
        })
    }

    fn write_at(&self, pos: usize, bytes: &[u8]) {
        debug_assert!(pos + bytes.len() <= MEMORY_CHUNK_SIZE);
        // SAFETY: in-bounds per the assert; the target range is above every
        // published END, so no reader aliases it (see type-level comment).
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(pos), bytes.len());
        }
    }

    fn read_u64(&self, pos: usize) -> u64 {
        debug_assert!(pos + 8 <= MEMORY_CHUNK_SIZE);
        let mut raw = [0u8; 8];
        // SAFETY: in-bounds; the prefix slot is either below the published
        // END or being read under the same mutex the producer patches it
        // under, so the bytes are stable for the duration of the read.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base.add(pos), raw.as_mut_ptr(), 8);
        }
        u64::from_le_bytes(raw)
    }

    fn read_into(&self, pos: usize, len: usize, out: &mut Vec<u8>) {
        debug_assert!(pos + len <= MEMORY_CHUNK_SIZE);
        // SAFETY: in-bounds; the range lies below the published END of a
        // committed message and is never written again.
        unsafe {
            out.extend_from_slice(std::slice::from_raw_parts(self.base.add(pos), len));
        }
    }

    fn into_buffer(self) -> MemChunk {
        self.buffer.into_inner()
    }
}

struct HandoverState {
    chunks: VecDeque<Arc<OutputChunk>>,
    first_pos: usize,
    buffers_allocated: u64,
    shutdown: bool,
}

struct Handover {
    state: Mutex<HandoverState>,
    ready: Condvar,
}

/// Producer half, owned by the analyser thread.
pub struct OutputBuffer {
    pool: Arc<MemoryPool>,
    shared: Arc<Handover>,
    charsets: CharsetRegistry,
    last: Arc<OutputChunk>,
    last_pos: usize,
    cur: Option<(Arc<OutputChunk>, usize)>,
    message_length: u64,
}

impl OutputBuffer {
    pub fn new(pool: Arc<MemoryPool>) -> Result<Self> {
        let first = OutputChunk::new(pool.acquire("output buffer")?);
        let shared = Arc::new(Handover {
            state: Mutex::new(HandoverState {
                chunks: VecDeque::from([first.clone()]),
                first_pos: 0,
                buffers_allocated: 1,
                shutdown: false,
            }),
            ready: Condvar::new(),
        });
        Ok(Self {
            pool,
            shared,
            charsets: CharsetRegistry::new(),
            last: first,
            last_pos: 0,
            cur: None,
            message_length: 0,
        })
    }

    /// Consumer half for the writer thread.
    pub fn reader(&self) -> OutputReader {
        OutputReader {
            shared: self.shared.clone(),
            pool: self.pool.clone(),
        }
    }

    pub fn charsets(&self) -> &CharsetRegistry {
        &self.charsets
    }

    /// Resolve the configured default character sets by Oracle name.
    pub fn set_nls_charset(&mut self, nls_charset: &str, nls_nchar_charset: &str) -> Result<()> {
        self.charsets.set_defaults(nls_charset, nls_nchar_charset)
    }

    /// Reserve the length prefix of a new message and snapshot the patch
    /// point.
    pub fn begin_message(&mut self) -> Result<()> {
        debug_assert!(self.cur.is_none(), "previous message not committed");
        self.cur = Some((self.last.clone(), self.last_pos));
        self.message_length = 0;
        self.last.write_at(self.last_pos, &0u64.to_le_bytes());
        self.shift(MESSAGE_LENGTH_SIZE)
    }

    pub fn append(&mut self, byte: u8) -> Result<()> {
        self.last.write_at(self.last_pos, &[byte]);
        self.message_length += 1;
        self.shift(1)
    }

    pub fn append_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let room = MEMORY_CHUNK_SIZE - self.last_pos;
            let take = room.min(bytes.len());
            self.last.write_at(self.last_pos, &bytes[..take]);
            self.message_length += take as u64;
            self.shift(take)?;
            bytes = &bytes[take..];
        }
        Ok(())
    }

    pub fn append_str(&mut self, s: &str) -> Result<()> {
        self.append_bytes(s.as_bytes())
    }

    /// Pad the message to an 8-byte boundary, patch its length prefix, and
    /// publish it to the writer.
    pub fn commit_message(&mut self) -> Result<()> {
        let prefix = if self.message_length == 0 {
            warn!("commit of zero-length message");
            EMPTY_MESSAGE_PREFIX
        } else {
            self.message_length
        };

        let pad = (8 - (self.message_length as usize & 7)) & 7;
        if pad > 0 {
            // positions stay 8-aligned, so padding never straddles a chunk
            self.last.write_at(self.last_pos, &[0u8; 7][..pad]);
            self.shift(pad)?;
        }

        let (cur, cur_pos) = self
            .cur
            .take()
            .ok_or_else(|| eyre::eyre!("commit without a begun message"))?;
        {
            let _state = self.shared.state.lock();
            cur.write_at(cur_pos, &prefix.to_le_bytes());
            if !Arc::ptr_eq(&cur, &self.last) {
                cur.end.store(MEMORY_CHUNK_SIZE, Ordering::Relaxed);
            }
            self.last.end.store(self.last_pos, Ordering::Relaxed);
            self.shared.ready.notify_all();
        }
        Ok(())
    }

    /// Payload bytes so far plus the length prefix.
    pub fn current_message_size(&self) -> usize {
        self.message_length as usize + MESSAGE_LENGTH_SIZE
    }

    /// Chunks currently linked into the buffer.
    pub fn buffers_allocated(&self) -> u64 {
        self.shared.state.lock().buffers_allocated
    }

    /// Wake the writer for session teardown; it drains committed messages
    /// and then sees end-of-stream.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        self.shared.ready.notify_all();
    }

    fn shift(&mut self, bytes: usize) -> Result<()> {
        self.last_pos += bytes;
        debug_assert!(self.last_pos <= MEMORY_CHUNK_SIZE);

        if self.last_pos >= MEMORY_CHUNK_SIZE {
            let next = OutputChunk::new(self.pool.acquire("output buffer")?);
            {
                let mut state = self.shared.state.lock();
                self.last.end.store(MEMORY_CHUNK_SIZE, Ordering::Relaxed);
                state.chunks.push_back(next.clone());
                state.buffers_allocated += 1;
            }
            self.last = next;
            self.last_pos = 0;
        }
        Ok(())
    }
}

/// Consumer half, used by the writer thread.
pub struct OutputReader {
    shared: Arc<Handover>,
    pool: Arc<MemoryPool>,
}

impl OutputReader {
    /// Block until the next complete message is published, returning its
    /// payload. Returns `None` once the buffer shuts down and every
    /// committed message has been drained.
    pub fn next_message(&mut self) -> Option<Vec<u8>> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(payload) = extract(&self.pool, &mut state) {
                return Some(payload);
            }
            if state.shutdown {
                return None;
            }
            self.shared.ready.wait(&mut state);
        }
    }

    /// Non-blocking variant: the next complete message, if one is ready.
    pub fn try_next(&mut self) -> Option<Vec<u8>> {
        let mut state = self.shared.state.lock();
        extract(&self.pool, &mut state)
    }
}

/// Pop one complete message off the head of the queue, releasing drained
/// chunks back to the pool. Runs under the handover mutex.
fn extract(pool: &MemoryPool, state: &mut HandoverState) -> Option<Vec<u8>> {
    loop {
        // skip fully drained chunks
        loop {
            let first = state.chunks.front()?;
            let end = first.end.load(Ordering::Relaxed);
            if state.first_pos < end {
                break;
            }
            if end == MEMORY_CHUNK_SIZE && state.chunks.len() > 1 {
                let chunk = state.chunks.pop_front().expect("front checked above");
                state.first_pos = 0;
                state.buffers_allocated -= 1;
                if let Ok(chunk) = Arc::try_unwrap(chunk) {
                    pool.release(chunk.into_buffer());
                }
                continue;
            }
            return None;
        }

        let first = state.chunks.front().expect("non-empty after drain loop");
        let prefix = first.read_u64(state.first_pos);
        if prefix == 0 {
            // reserved prefix of an in-flight message
            return None;
        }
        if prefix == EMPTY_MESSAGE_PREFIX {
            // committed zero-length message: skip the slot, deliver nothing
            advance(pool, state, MESSAGE_LENGTH_SIZE);
            continue;
        }
        let length = prefix as usize;
        let padded = align8(length);

        // copy the payload, which may span chunks
        let mut payload = Vec::with_capacity(length);
        let mut idx = 0;
        let mut pos = state.first_pos + MESSAGE_LENGTH_SIZE;
        let mut left = length;
        while left > 0 {
            if pos >= MEMORY_CHUNK_SIZE {
                idx += 1;
                pos = 0;
                continue;
            }
            let take = (MEMORY_CHUNK_SIZE - pos).min(left);
            state.chunks[idx].read_into(pos, take, &mut payload);
            pos += take;
            left -= take;
        }

        advance(pool, state, MESSAGE_LENGTH_SIZE + padded);
        return Some(payload);
    }
}

/// Advance the consumer position by `consumed` bytes, freeing chunks it
/// drains on the way. Runs under the handover mutex.
fn advance(pool: &MemoryPool, state: &mut HandoverState, mut consumed: usize) {
    while consumed > 0 {
        let in_chunk = MEMORY_CHUNK_SIZE - state.first_pos;
        if consumed >= in_chunk && state.chunks.len() > 1 {
            consumed -= in_chunk;
            let chunk = state.chunks.pop_front().expect("successor exists");
            state.first_pos = 0;
            state.buffers_allocated -= 1;
            if let Ok(chunk) = Arc::try_unwrap(chunk) {
                pool.release(chunk.into_buffer());
            }
        } else {
            state.first_pos += consumed;
            consumed = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> OutputBuffer {
        OutputBuffer::new(Arc::new(MemoryPool::new(0, 64))).unwrap()
    }

    #[test]
    fn single_message_round_trips() {
        let mut out = buffer();
        let mut reader = out.reader();

        out.begin_message().unwrap();
        out.append_str("hello").unwrap();
        out.commit_message().unwrap();

        assert_eq!(reader.try_next().unwrap(), b"hello");
        assert!(reader.try_next().is_none());
    }

    #[test]
    fn uncommitted_message_is_invisible() {
        let mut out = buffer();
        let mut reader = out.reader();

        out.begin_message().unwrap();
        out.append_str("partial").unwrap();
        assert!(reader.try_next().is_none());

        out.commit_message().unwrap();
        assert_eq!(reader.try_next().unwrap(), b"partial");
    }

    #[test]
    fn zero_length_commit_is_skipped_without_stalling() {
        let mut out = buffer();
        let mut reader = out.reader();

        out.begin_message().unwrap();
        out.commit_message().unwrap();
        assert!(reader.try_next().is_none());

        out.begin_message().unwrap();
        out.append_str("after-empty").unwrap();
        out.commit_message().unwrap();
        assert_eq!(reader.try_next().unwrap(), b"after-empty");
    }

    #[test]
    fn zero_length_commit_between_messages_preserves_order() {
        let mut out = buffer();
        let mut reader = out.reader();

        out.begin_message().unwrap();
        out.append_str("first").unwrap();
        out.commit_message().unwrap();

        out.begin_message().unwrap();
        out.commit_message().unwrap();

        out.begin_message().unwrap();
        out.append_str("second").unwrap();
        out.commit_message().unwrap();

        assert_eq!(reader.try_next().unwrap(), b"first");
        assert_eq!(reader.try_next().unwrap(), b"second");
        assert!(reader.try_next().is_none());
    }

    #[test]
    fn blocked_reader_survives_a_zero_length_commit() {
        let mut out = buffer();
        let mut reader = out.reader();

        let consumer = std::thread::spawn(move || reader.next_message());

        out.begin_message().unwrap();
        out.commit_message().unwrap();
        out.begin_message().unwrap();
        out.append_str("real").unwrap();
        out.commit_message().unwrap();

        assert_eq!(consumer.join().unwrap().unwrap(), b"real");
    }

    #[test]
    fn messages_arrive_in_commit_order() {
        let mut out = buffer();
        let mut reader = out.reader();

        for i in 0..10u32 {
            out.begin_message().unwrap();
            out.append_str(&format!("msg-{i}")).unwrap();
            out.commit_message().unwrap();
        }
        for i in 0..10u32 {
            assert_eq!(reader.try_next().unwrap(), format!("msg-{i}").as_bytes());
        }
    }

    #[test]
    fn message_spanning_chunks_is_reassembled() {
        let mut out = buffer();
        let mut reader = out.reader();

        let body = vec![0x5A_u8; MEMORY_CHUNK_SIZE + 1000];
        out.begin_message().unwrap();
        out.append_bytes(&body).unwrap();
        out.commit_message().unwrap();

        assert!(out.buffers_allocated() >= 2);
        assert_eq!(reader.try_next().unwrap(), body);
    }

    #[test]
    fn chunk_boundary_append_preserves_byte_order() {
        let mut out = buffer();
        let mut reader = out.reader();

        // fill the first chunk to 3 bytes short of the boundary
        out.begin_message().unwrap();
        let fill = MEMORY_CHUNK_SIZE - MESSAGE_LENGTH_SIZE - 3;
        out.append_bytes(&vec![1u8; fill]).unwrap();
        for b in [2u8, 3, 4, 5, 6] {
            out.append(b).unwrap();
        }
        out.commit_message().unwrap();
        assert_eq!(out.buffers_allocated(), 2);

        let msg = reader.try_next().unwrap();
        assert_eq!(msg.len(), fill + 5);
        assert_eq!(&msg[fill..], &[2, 3, 4, 5, 6]);
    }

    #[test]
    fn drained_chunks_return_to_pool() {
        let pool = Arc::new(MemoryPool::new(0, 64));
        let mut out = OutputBuffer::new(pool.clone()).unwrap();
        let mut reader = out.reader();

        for _ in 0..3 {
            out.begin_message().unwrap();
            out.append_bytes(&vec![7u8; MEMORY_CHUNK_SIZE]).unwrap();
            out.commit_message().unwrap();
            reader.try_next().unwrap();
        }
        // chunks recycled each round instead of accumulating
        assert!(pool.available() >= 1);
        assert!(pool.allocated() <= 3, "allocated {}", pool.allocated());
    }

    #[test]
    fn reader_blocks_until_commit_and_sees_shutdown() {
        let mut out = buffer();
        let mut reader = out.reader();

        let handle = std::thread::spawn(move || {
            let mut got = Vec::new();
            while let Some(msg) = reader.next_message() {
                got.push(msg);
            }
            got
        });

        out.begin_message().unwrap();
        out.append_str("wakeup").unwrap();
        out.commit_message().unwrap();
        out.shutdown();

        let got = handle.join().unwrap();
        assert_eq!(got, vec![b"wakeup".to_vec()]);
    }

    #[test]
    fn current_message_size_includes_prefix() {
        let mut out = buffer();
        out.begin_message().unwrap();
        assert_eq!(out.current_message_size(), MESSAGE_LENGTH_SIZE);
        out.append_str("abcd").unwrap();
        assert_eq!(out.current_message_size(), MESSAGE_LENGTH_SIZE + 4);
        out.commit_message().unwrap();
    }
}
