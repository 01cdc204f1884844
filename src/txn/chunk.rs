//! # Transaction Chunk Store
//!
//! Append-only, chunk-linked byte arena holding the serialized undo/redo
//! record pairs of one transaction. Each link is a pool chunk; pairs are
//! stored as fixed-layout frames so the store never depends on heap object
//! lifetimes and in-flight chunks keep a stable byte layout.
//!
//! ## Frame Layout
//!
//! ```text
//! Offset            Size              Field
//! ----------------  ----------------  -----------------------------------
//! ROW_HEADER_OP     4 (+4 pad)        combined opcode (undo<<16 | redo)
//! ROW_HEADER_REDO1  RECORD_META_SIZE  undo record metadata
//! ROW_HEADER_REDO2  RECORD_META_SIZE  redo record metadata
//! ROW_HEADER_DATA   len1 + len2       undo payload, then redo payload
//! end - 16          8                 scn
//! end - 8           8                 total frame size
//! ```
//!
//! The trailing size word lets the store locate the final frame from the
//! chunk tail without a forward walk (rollback fast path, tail snapshot).
//!
//! ## Mutation Discipline
//!
//! Frames are appended in arrival order. `rollback_last` pops the tail frame;
//! `delete_part` splices out an interior frame matched against a partial
//! rollback record. A chunk that becomes empty is unlinked and returned to
//! the pool. Appends acquire the spill chunk before writing a single byte, so
//! a failed allocation leaves the store untouched.

use eyre::{ensure, eyre, Result};
use zerocopy::{FromBytes, IntoBytes};

use super::transaction::matches_for_rollback;
use crate::config::MEMORY_CHUNK_SIZE;
use crate::memory::{MemChunk, MemoryPool};
use crate::redo::record::{RecordMeta, RECORD_META_SIZE};
use crate::redo::{RedoRecord, Scn};

/// Combined opcode, u32 little-endian (followed by 4 bytes of padding).
pub const ROW_HEADER_OP: usize = 0;
/// Undo record metadata.
pub const ROW_HEADER_REDO1: usize = 8;
/// Redo record metadata.
pub const ROW_HEADER_REDO2: usize = ROW_HEADER_REDO1 + RECORD_META_SIZE;
/// Start of the concatenated payloads.
pub const ROW_HEADER_DATA: usize = ROW_HEADER_REDO2 + RECORD_META_SIZE;
/// Trailing `[scn: u64][size: u64]` words.
pub const ROW_TRAILER_SIZE: usize = 16;
/// Fixed overhead of one frame.
pub const ROW_HEADER_TOTAL: usize = ROW_HEADER_DATA + ROW_TRAILER_SIZE;

const _: () = assert!(
    ROW_HEADER_TOTAL < MEMORY_CHUNK_SIZE,
    "a frame header must fit in a single chunk"
);

/// One decoded frame: the stored pair plus its commit-walk key.
#[derive(Debug, Clone)]
pub struct StoredPair {
    pub op: u32,
    pub rec1: RedoRecord,
    pub rec2: RedoRecord,
    pub scn: Scn,
}

/// One link of the chain: a pool chunk plus its fill state.
struct TransactionChunk {
    buffer: MemChunk,
    elements: u64,
    size: usize,
}

impl TransactionChunk {
    fn new(buffer: MemChunk) -> Self {
        Self {
            buffer,
            elements: 0,
            size: 0,
        }
    }

    fn free(&self) -> usize {
        MEMORY_CHUNK_SIZE - self.size
    }

    /// Forward walk collecting the offset of every frame.
    fn frame_offsets(&self) -> Result<Vec<usize>> {
        let mut offsets = Vec::with_capacity(self.elements as usize);
        let mut pos = 0;
        while pos < self.size {
            offsets.push(pos);
            let (len1, len2) = read_payload_lengths(&self.buffer[..], pos)?;
            pos += ROW_HEADER_TOTAL + len1 + len2;
        }
        ensure!(
            pos == self.size && offsets.len() == self.elements as usize,
            "chunk walk out of step: {} bytes ended at {}, {} frames counted, {} stored",
            self.size,
            pos,
            offsets.len(),
            self.elements
        );
        Ok(offsets)
    }
}

/// The chunk chain of one transaction. Index 0 holds the oldest frames; the
/// vector tail is the chunk appends go to.
#[derive(Default)]
pub struct ChunkChain {
    chunks: Vec<TransactionChunk>,
}

impl ChunkChain {
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn total_size(&self) -> usize {
        self.chunks.iter().map(|tc| tc.size).sum()
    }

    pub fn elements(&self) -> u64 {
        self.chunks.iter().map(|tc| tc.elements).sum()
    }

    /// Append one `(rec1, rec2, scn)` frame, spilling to a fresh pool chunk
    /// when the current one cannot hold it.
    pub fn add(
        &mut self,
        pool: &MemoryPool,
        op: u32,
        rec1: &RedoRecord,
        rec2: &RedoRecord,
        scn: Scn,
    ) -> Result<()> {
        let frame = ROW_HEADER_TOTAL + rec1.data.len() + rec2.data.len();
        ensure!(
            frame <= MEMORY_CHUNK_SIZE,
            "record pair of {} bytes exceeds chunk capacity {}",
            frame,
            MEMORY_CHUNK_SIZE
        );

        let needs_spill = self
            .chunks
            .last()
            .map(|tc| tc.free() < frame)
            .unwrap_or(true);
        if needs_spill {
            self.chunks
                .push(TransactionChunk::new(pool.acquire("transaction chunk")?));
        }

        let tc = self.chunks.last_mut().expect("spill guaranteed a chunk");
        write_frame(&mut tc.buffer[..], tc.size, op, rec1, rec2, scn);
        tc.size += frame;
        tc.elements += 1;
        Ok(())
    }

    /// Pop the most recent frame. An emptied chunk is unlinked and returned
    /// to the pool.
    pub fn rollback_last(&mut self, pool: &MemoryPool) -> Result<()> {
        let tc = self
            .chunks
            .last_mut()
            .ok_or_else(|| eyre!("rollback of empty transaction"))?;
        ensure!(tc.elements > 0, "rollback of empty transaction chunk");

        let frame = read_frame_size(&tc.buffer[..], tc.size)?;
        tc.size -= frame;
        tc.elements -= 1;
        if tc.elements == 0 {
            let tc = self.chunks.pop().expect("tail chunk checked above");
            pool.release(tc.buffer);
        }
        Ok(())
    }

    /// Locate the most recent frame matching the partial-rollback pair and
    /// splice it out. Returns whether a match was found.
    pub fn delete_part(
        &mut self,
        pool: &MemoryPool,
        rb1: &RedoRecord,
        rb2: &RedoRecord,
    ) -> Result<bool> {
        for idx in (0..self.chunks.len()).rev() {
            let offsets = self.chunks[idx].frame_offsets()?;
            for &pos in offsets.iter().rev() {
                let (pair, frame) = read_frame(&self.chunks[idx].buffer[..], pos)?;
                if !matches_for_rollback(&pair.rec1, &pair.rec2, rb1, rb2) {
                    continue;
                }

                let tc = &mut self.chunks[idx];
                tc.buffer.copy_within(pos + frame..tc.size, pos);
                tc.size -= frame;
                tc.elements -= 1;
                if tc.elements == 0 {
                    let tc = self.chunks.remove(idx);
                    pool.release(tc.buffer);
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Decode the most recent frame, if any.
    pub fn last_pair(&self) -> Result<Option<StoredPair>> {
        let Some(tc) = self.chunks.last() else {
            return Ok(None);
        };
        let frame = read_frame_size(&tc.buffer[..], tc.size)?;
        let (pair, _) = read_frame(&tc.buffer[..], tc.size - frame)?;
        Ok(Some(pair))
    }

    /// Iterate every frame in insertion order.
    pub fn frames(&self) -> FrameIter<'_> {
        FrameIter {
            chain: self,
            chunk_idx: 0,
            pos: 0,
        }
    }

    /// Release every chunk back to the pool.
    pub fn clear(&mut self, pool: &MemoryPool) {
        for tc in self.chunks.drain(..) {
            pool.release(tc.buffer);
        }
    }
}

pub struct FrameIter<'a> {
    chain: &'a ChunkChain,
    chunk_idx: usize,
    pos: usize,
}

impl Iterator for FrameIter<'_> {
    type Item = Result<StoredPair>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let tc = self.chain.chunks.get(self.chunk_idx)?;
            if self.pos >= tc.size {
                self.chunk_idx += 1;
                self.pos = 0;
                continue;
            }
            return match read_frame(&tc.buffer[..], self.pos) {
                Ok((pair, frame)) => {
                    self.pos += frame;
                    Some(Ok(pair))
                }
                Err(e) => {
                    // stop the walk; a corrupt frame poisons the rest of the chunk
                    self.chunk_idx = self.chain.chunks.len();
                    Some(Err(e))
                }
            };
        }
    }
}

fn write_frame(
    buf: &mut [u8],
    pos: usize,
    op: u32,
    rec1: &RedoRecord,
    rec2: &RedoRecord,
    scn: Scn,
) {
    let (len1, len2) = (rec1.data.len(), rec2.data.len());
    let frame = ROW_HEADER_TOTAL + len1 + len2;

    buf[pos + ROW_HEADER_OP..pos + ROW_HEADER_OP + 4].copy_from_slice(&op.to_le_bytes());
    buf[pos + ROW_HEADER_OP + 4..pos + ROW_HEADER_REDO1].fill(0);
    buf[pos + ROW_HEADER_REDO1..pos + ROW_HEADER_REDO2]
        .copy_from_slice(rec1.meta().as_bytes());
    buf[pos + ROW_HEADER_REDO2..pos + ROW_HEADER_DATA].copy_from_slice(rec2.meta().as_bytes());
    buf[pos + ROW_HEADER_DATA..pos + ROW_HEADER_DATA + len1].copy_from_slice(&rec1.data);
    buf[pos + ROW_HEADER_DATA + len1..pos + ROW_HEADER_DATA + len1 + len2]
        .copy_from_slice(&rec2.data);
    buf[pos + frame - 16..pos + frame - 8].copy_from_slice(&scn.to_le_bytes());
    buf[pos + frame - 8..pos + frame].copy_from_slice(&(frame as u64).to_le_bytes());
}

fn read_payload_lengths(buf: &[u8], pos: usize) -> Result<(usize, usize)> {
    ensure!(
        pos + ROW_HEADER_DATA <= buf.len(),
        "frame header extends past chunk: {} + {} > {}",
        pos,
        ROW_HEADER_DATA,
        buf.len()
    );
    let meta1 = RecordMeta::read_from_bytes(&buf[pos + ROW_HEADER_REDO1..pos + ROW_HEADER_REDO2])
        .map_err(|_| eyre!("corrupt undo record metadata at {}", pos))?;
    let meta2 = RecordMeta::read_from_bytes(&buf[pos + ROW_HEADER_REDO2..pos + ROW_HEADER_DATA])
        .map_err(|_| eyre!("corrupt redo record metadata at {}", pos))?;
    Ok((meta1.length.get() as usize, meta2.length.get() as usize))
}

fn read_frame_size(buf: &[u8], end: usize) -> Result<usize> {
    ensure!(end >= ROW_TRAILER_SIZE, "chunk too small for a frame trailer");
    let size = u64::from_le_bytes(buf[end - 8..end].try_into().expect("8-byte slice")) as usize;
    ensure!(
        size >= ROW_HEADER_TOTAL && size <= end,
        "corrupt frame size {} at chunk offset {}",
        size,
        end
    );
    Ok(size)
}

fn read_frame(buf: &[u8], pos: usize) -> Result<(StoredPair, usize)> {
    let (len1, len2) = read_payload_lengths(buf, pos)?;
    let frame = ROW_HEADER_TOTAL + len1 + len2;
    ensure!(
        pos + frame <= buf.len(),
        "frame payload extends past chunk: {} + {} > {}",
        pos,
        frame,
        buf.len()
    );

    let op = u32::from_le_bytes(
        buf[pos + ROW_HEADER_OP..pos + ROW_HEADER_OP + 4]
            .try_into()
            .expect("4-byte slice"),
    );
    let meta1 = RecordMeta::read_from_bytes(&buf[pos + ROW_HEADER_REDO1..pos + ROW_HEADER_REDO2])
        .map_err(|_| eyre!("corrupt undo record metadata at {}", pos))?;
    let meta2 = RecordMeta::read_from_bytes(&buf[pos + ROW_HEADER_REDO2..pos + ROW_HEADER_DATA])
        .map_err(|_| eyre!("corrupt redo record metadata at {}", pos))?;

    let data1 = buf[pos + ROW_HEADER_DATA..pos + ROW_HEADER_DATA + len1].to_vec();
    let data2 = buf[pos + ROW_HEADER_DATA + len1..pos + ROW_HEADER_DATA + len1 + len2].to_vec();
    let scn = u64::from_le_bytes(
        buf[pos + frame - 16..pos + frame - 8]
            .try_into()
            .expect("8-byte slice"),
    );

    Ok((
        StoredPair {
            op,
            rec1: RedoRecord::from_meta(&meta1, data1),
            rec2: RedoRecord::from_meta(&meta2, data2),
            scn,
        },
        frame,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redo::record::Xid;

    fn pool() -> MemoryPool {
        MemoryPool::new(0, 16)
    }

    fn rec(op_code: u32, slt: u8, rci: u8, uba: u64, scn: Scn, payload: usize) -> RedoRecord {
        RedoRecord {
            op_code,
            slt,
            rci,
            uba,
            scn,
            xid: Xid::new(1, 1, 1),
            data: vec![0xCD; payload],
            ..Default::default()
        }
    }

    fn rollback_for(slt: u8, rci: u8, uba: u64, scn: Scn) -> (RedoRecord, RedoRecord) {
        let rb1 = RedoRecord {
            uba,
            ..Default::default()
        };
        let rb2 = RedoRecord {
            slt,
            rci,
            scn,
            op_flags: crate::redo::record::OP_FLAGS_BEGIN,
            ..Default::default()
        };
        (rb1, rb2)
    }

    #[test]
    fn add_then_iterate_round_trips() {
        let pool = pool();
        let mut chain = ChunkChain::new();
        let r1 = rec(0x0501, 7, 3, 0xAA, 100, 24);
        let r2 = rec(0x0B02, 0, 0, 0, 100, 12);
        chain.add(&pool, 0x0501_0B02, &r1, &r2, 100).unwrap();

        assert_eq!(chain.elements(), 1);
        let pairs: Vec<_> = chain.frames().map(|p| p.unwrap()).collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].op, 0x0501_0B02);
        assert_eq!(pairs[0].rec1, r1);
        assert_eq!(pairs[0].rec2, r2);
        assert_eq!(pairs[0].scn, 100);
    }

    #[test]
    fn spill_allocates_second_chunk() {
        let pool = pool();
        let mut chain = ChunkChain::new();
        let big = MEMORY_CHUNK_SIZE / 2;
        for scn in 0..3 {
            let r1 = rec(0x0501, 1, 1, 1, scn, big - ROW_HEADER_TOTAL);
            let r2 = rec(0x0B02, 0, 0, 0, scn, 0);
            chain.add(&pool, 0x0501_0B02, &r1, &r2, scn).unwrap();
        }
        assert_eq!(chain.chunk_count(), 2);
        assert_eq!(chain.elements(), 3);
        assert_eq!(chain.frames().count(), 3);
    }

    #[test]
    fn rollback_last_pops_tail_and_frees_empty_chunk() {
        let pool = pool();
        let mut chain = ChunkChain::new();
        let r1 = rec(0x0501, 1, 1, 1, 5, 16);
        let r2 = rec(0x0B02, 0, 0, 0, 5, 8);
        chain.add(&pool, 0x0501_0B02, &r1, &r2, 5).unwrap();
        chain.add(&pool, 0x0501_0B02, &r1, &r2, 6).unwrap();

        chain.rollback_last(&pool).unwrap();
        assert_eq!(chain.elements(), 1);
        assert_eq!(chain.last_pair().unwrap().unwrap().scn, 5);

        chain.rollback_last(&pool).unwrap();
        assert!(chain.is_empty());
        assert_eq!(pool.available(), 1);
        assert!(chain.rollback_last(&pool).is_err());
    }

    #[test]
    fn delete_part_splices_interior_frame() {
        let pool = pool();
        let mut chain = ChunkChain::new();
        for (i, scn) in [100u64, 110, 120].iter().enumerate() {
            let r1 = rec(0x0501, i as u8, 3, 0xB0 + i as u64, *scn, 20);
            let r2 = rec(0x0B02, 0, 0, 0, *scn, 10);
            chain.add(&pool, 0x0501_0B02, &r1, &r2, *scn).unwrap();
        }

        let (rb1, rb2) = rollback_for(1, 3, 0xB1, 150);
        assert!(chain.delete_part(&pool, &rb1, &rb2).unwrap());
        assert_eq!(chain.elements(), 2);

        let scns: Vec<_> = chain.frames().map(|p| p.unwrap().scn).collect();
        assert_eq!(scns, vec![100, 120]);

        // no second match for the same rollback
        assert!(!chain.delete_part(&pool, &rb1, &rb2).unwrap());
    }

    #[test]
    fn delete_part_round_trip_restores_bytes() {
        let pool = pool();
        let mut chain = ChunkChain::new();
        let base1 = rec(0x0501, 1, 1, 0x10, 50, 16);
        let base2 = rec(0x0B02, 0, 0, 0, 50, 8);
        chain.add(&pool, 0x0501_0B02, &base1, &base2, 50).unwrap();
        let before = chain.total_size();

        let extra1 = rec(0x0501, 9, 9, 0x99, 60, 32);
        let extra2 = rec(0x0B03, 0, 0, 0, 60, 4);
        chain.add(&pool, 0x0501_0B03, &extra1, &extra2, 60).unwrap();

        let (rb1, rb2) = rollback_for(9, 9, 0x99, 70);
        assert!(chain.delete_part(&pool, &rb1, &rb2).unwrap());
        assert_eq!(chain.total_size(), before);
        assert_eq!(chain.elements(), 1);
    }
}
