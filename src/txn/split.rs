//! # Multi-Block UNDO Reassembly
//!
//! Large undo records arrive split across redo blocks, flagged HEAD / MID /
//! TAIL (and optionally LAST-BUFFER-SPLIT when the boundary cuts through a
//! field). Fragments are parked here, per transaction, until a transaction
//! boundary forces the merge; the merged record then enters the chunk store
//! like any other pair.
//!
//! ## Ordering
//!
//! The pending list is kept in ascending `(scn, sub_scn)` order; fragments
//! with equal keys keep their arrival order. The merge walk groups adjacent
//! fragments sharing `(slt, rci)` and closes a group when a role would be
//! duplicated.
//!
//! ## Merge Arithmetic
//!
//! Merging concatenates HEAD (+ optional MID) and TAIL payloads while
//! rewriting the field-length table:
//!
//! - the tail's first two fields are continuation bookkeeping and are
//!   dropped: merged `field_cnt = head.field_cnt + tail.field_cnt - 2`
//! - under LAST-BUFFER-SPLIT, the head's final field continues into the
//!   tail's first kept field; the two lengths fuse into one entry and the
//!   head's entry is dropped
//! - every copied region is padded to a 4-byte boundary
//!
//! After the byte merge, the multi-block and split bits are cleared in the
//! undo-block header and the undo post-parse reruns to recompute derived
//! offsets.

use eyre::{bail, ensure, Result};

use crate::config::align4;
use crate::redo::opcode::{reprocess_undo, UNDO_BLOCK_FLG_OFFSET};
use crate::redo::record::{
    read_u16, write_u16, FLG_LASTBUFFERSPLIT, FLG_MULTIBLOCKUNDOHEAD, FLG_MULTIBLOCKUNDOMID,
    FLG_MULTIBLOCKUNDOTAIL,
};
use crate::redo::RedoRecord;

/// One parked fragment. Only the HEAD fragment carries the companion redo
/// record of the eventual pair.
#[derive(Debug, Clone)]
pub struct SplitBlock {
    pub rec1: RedoRecord,
    pub rec2: Option<RedoRecord>,
}

/// The per-transaction list of pending fragments.
#[derive(Debug, Default)]
pub struct SplitBlockList {
    blocks: Vec<SplitBlock>,
}

impl SplitBlockList {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Insert a fragment keeping ascending `(scn, sub_scn)` order; equal keys
    /// stay in arrival order.
    pub fn insert(&mut self, rec1: RedoRecord, rec2: Option<RedoRecord>) {
        let key = (rec1.scn, rec1.sub_scn);
        let idx = self
            .blocks
            .iter()
            .position(|b| (b.rec1.scn, b.rec1.sub_scn) > key)
            .unwrap_or(self.blocks.len());
        self.blocks.insert(idx, SplitBlock { rec1, rec2 });
    }

    /// Drain the list into merge groups: runs of fragments sharing
    /// `(slt, rci)`, closed early when a role repeats.
    pub fn drain_groups(&mut self) -> Vec<SplitGroup> {
        let mut groups = Vec::new();
        let mut current: Option<(u8, u8)> = None;
        let mut group = SplitGroup::default();

        for block in self.blocks.drain(..) {
            let key = (block.rec1.slt, block.rec1.rci);
            let is_head = block.rec1.flg & FLG_MULTIBLOCKUNDOHEAD != 0;
            let is_tail = block.rec1.flg & FLG_MULTIBLOCKUNDOTAIL != 0;

            let boundary = match current {
                None => false,
                Some(k) => {
                    k != key
                        || (is_head && group.head.is_some())
                        || (is_tail && group.tail.is_some())
                        || (!is_head && !is_tail && group.mid.is_some())
                }
            };
            if boundary {
                groups.push(std::mem::take(&mut group));
            }
            current = Some(key);

            if is_head {
                group.head = Some(block);
            } else if is_tail {
                group.tail = Some(block);
            } else {
                group.mid = Some(block);
            }
        }

        if current.is_some() {
            groups.push(group);
        }
        groups
    }

    /// Iterate the pending fragments in list order (diagnostics, tests).
    pub fn iter(&self) -> impl Iterator<Item = &SplitBlock> {
        self.blocks.iter()
    }
}

/// An accumulated HEAD/MID/TAIL group awaiting merge.
#[derive(Debug, Default)]
pub struct SplitGroup {
    pub head: Option<SplitBlock>,
    pub mid: Option<SplitBlock>,
    pub tail: Option<SplitBlock>,
}

/// Merge one group into a complete undo record and its companion redo record.
///
/// HEAD and TAIL are mandatory; a group missing either cannot be reassembled
/// and aborts the session.
pub fn merge_group(group: SplitGroup) -> Result<(RedoRecord, RedoRecord)> {
    let SplitGroup { head, mid, tail } = group;
    let (Some(head), Some(tail)) = (head, tail) else {
        bail!("merging of incomplete split UNDO block");
    };
    let Some(rec2) = head.rec2 else {
        bail!("merging of incomplete split UNDO block: head carries no companion record");
    };

    let mut rec1 = head.rec1;
    if let Some(mid) = mid {
        let mut mid1 = mid.rec1;
        merge_into(&mut rec1, &mut mid1)?;
    }
    let mut tail1 = tail.rec1;
    merge_into(&mut rec1, &mut tail1)?;

    // clear the multi-block and split bits in the undo-block header word
    ensure!(
        rec1.field_cnt >= 2,
        "merged undo record missing header fields"
    );
    let flg_pos = rec1.field_range(2).start + UNDO_BLOCK_FLG_OFFSET;
    ensure!(
        flg_pos + 2 <= rec1.data.len(),
        "merged undo record too short for its undo-block header"
    );
    let flg = read_u16(&rec1.data, flg_pos)
        & !(FLG_MULTIBLOCKUNDOHEAD
            | FLG_MULTIBLOCKUNDOMID
            | FLG_MULTIBLOCKUNDOTAIL
            | FLG_LASTBUFFERSPLIT);
    write_u16(&mut rec1.data, flg_pos, flg);

    reprocess_undo(&mut rec1)?;
    Ok((rec1, rec2))
}

/// Append `rec2`'s fields to `rec1`, rewriting the field-length table and the
/// derived offsets of `rec1` in place.
fn merge_into(rec1: &mut RedoRecord, rec2: &mut RedoRecord) -> Result<()> {
    let delta = rec1.field_lengths_delta as usize;
    let tail_delta = rec2.field_lengths_delta as usize;
    ensure!(
        rec1.field_cnt >= 1 && rec2.field_cnt >= 2,
        "split fragment field table too small to merge: head {}, continuation {}",
        rec1.field_cnt,
        rec2.field_cnt
    );
    ensure!(
        delta + 2 * (rec1.field_cnt as usize + 1) <= rec1.data.len()
            && tail_delta + 2 * (rec2.field_cnt as usize + 1) <= rec2.data.len(),
        "split fragment field table extends past payload"
    );

    let mut buffer = vec![0u8; rec1.data.len() + rec2.data.len() + 16];
    buffer[..delta].copy_from_slice(&rec1.data[..delta]);
    let mut pos = delta;

    if rec1.flg & FLG_LASTBUFFERSPLIT != 0 {
        let head_last = read_u16(&rec1.data, delta + rec1.field_cnt as usize * 2);
        let tail_first = read_u16(&rec2.data, tail_delta + 6);
        write_u16(&mut rec2.data, tail_delta + 6, head_last + tail_first);
        rec1.field_cnt -= 1;
    }

    let field_cnt = rec1.field_cnt + rec2.field_cnt - 2;
    write_u16(&mut buffer, pos, field_cnt);
    let head_entries = rec1.field_cnt as usize * 2;
    buffer[pos + 2..pos + 2 + head_entries]
        .copy_from_slice(&rec1.data[delta + 2..delta + 2 + head_entries]);
    let tail_entries = rec2.field_cnt as usize * 2 - 4;
    buffer[pos + 2 + head_entries..pos + 2 + head_entries + tail_entries]
        .copy_from_slice(&rec2.data[tail_delta + 6..tail_delta + 6 + tail_entries]);
    pos += align4((field_cnt as usize + 1) * 2);
    let merged_field_pos = pos;

    let head_payload = rec1.data.len() - rec1.field_pos as usize;
    buffer[pos..pos + head_payload].copy_from_slice(&rec1.data[rec1.field_pos as usize..]);
    pos += align4(head_payload);

    // the continuation's first two fields are delimiter bookkeeping
    let skip = align4(read_u16(&rec2.data, tail_delta + 2) as usize)
        + align4(read_u16(&rec2.data, tail_delta + 4) as usize);
    let tail_start = rec2.field_pos as usize + skip;
    ensure!(
        tail_start <= rec2.data.len(),
        "split continuation delimiter fields extend past payload: {} > {}",
        tail_start,
        rec2.data.len()
    );
    let tail_payload = rec2.data.len() - tail_start;
    buffer[pos..pos + tail_payload].copy_from_slice(&rec2.data[tail_start..]);
    pos += align4(tail_payload);

    buffer.truncate(pos);
    rec1.field_cnt = field_cnt;
    rec1.field_pos = merged_field_pos as u16;
    rec1.data = buffer;
    Ok(())
}
