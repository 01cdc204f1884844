//! # Transaction Orchestrator
//!
//! One `Transaction` per open XID. It receives parsed undo/redo pairs from
//! the analyser, routes multi-block fragments to the split list, resolves
//! partial and full rollbacks against the chunk store, and on commit walks
//! the stored frames assembling row-piece chains into logical DML events.
//!
//! ## Chain Assembly
//!
//! Row pieces of one logical row share `supp_log_bdba`/`supp_log_slot` and
//! object ids. Pieces are linked by index into a flush-scoped arena:
//!
//! - while the logical operation is an INSERT, new pieces prepend (Oracle
//!   emits insert pieces tail-first)
//! - an overwrite piece arriving after an insert piece slots in immediately
//!   before the current tail, keeping the insert piece as the true tail
//! - everything else appends
//!
//! The piece carrying the last-piece bit (`FB_L`) closes the chain and emits
//! one DML event; the arena resets and the next chain begins.
//!
//! ## Big Transactions
//!
//! After every event the producer-side message size is checked against the
//! writer's limit; an oversized transaction is divided at the next row
//! boundary by an implicit commit/begin pair on the same xid, so the writer
//! never sees a partial row.
//!
//! ## Lifecycle
//!
//! Created on the first record carrying a new XID, mutated only by the
//! analyser thread, destroyed after a successful flush or once the whole
//! transaction is known to be rolled back.

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;
use tracing::{trace, warn};

use super::chunk::ChunkChain;
use super::heap::HeapKey;
use super::index::{AssemblyIndices, LastOpKey};
use super::split::{self, SplitBlockList};
use crate::config::DATA_BUFFER_SIZE;
use crate::memory::MemoryPool;
use crate::output::buffer::OutputBuffer;
use crate::output::format::{DmlKind, Formatter};
use crate::redo::opcode::{
    combined_op, is_row_piece, OP_DELETE_MULTIPLE, OP_INSERT_MULTIPLE, OP_ROW_DELETE,
    OP_ROW_FORWARD, OP_ROW_INSERT, OP_ROW_OVERWRITE, OP_ROW_UPDATE, OP_TRUNCATE, SUB_ROW_INSERT,
};
use crate::redo::record::{FB_L, OP_FLAGS_BEGIN};
use crate::redo::{RedoRecord, Scn, Seq, Time, Xid, SCN_NONE};

/// `r1`/`r2` is a stored undo/redo pair; `rb1`/`rb2` is a partial-rollback
/// record pair. True iff the rollback cancels exactly that stored operation.
pub fn matches_for_rollback(
    r1: &RedoRecord,
    r2: &RedoRecord,
    rb1: &RedoRecord,
    rb2: &RedoRecord,
) -> bool {
    r1.slt == rb2.slt
        && r1.rci == rb2.rci
        && r1.uba == rb1.uba
        && r1.scn <= rb2.scn
        && (rb2.op_flags & OP_FLAGS_BEGIN != 0 || (r2.dba == rb1.dba && r2.slot == rb1.slot))
}

/// One logical transaction under assembly.
pub struct Transaction {
    pub xid: Xid,
    pub first_sequence: Seq,
    pub first_scn: Scn,
    pub last_scn: Scn,
    pub commit_time: Time,
    pub is_begin: bool,
    pub is_commit: bool,
    pub is_rollback: bool,
    pub shutdown: bool,
    op_codes: u64,
    chunks: ChunkChain,
    splits: SplitBlockList,
}

/// Arena slot for one row piece during a flush walk. Links are arena
/// indices; the arena lives for a single flush iteration.
struct Piece {
    rec1: RedoRecord,
    rec2: RedoRecord,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Transaction {
    pub fn new(xid: Xid) -> Self {
        Self {
            xid,
            first_sequence: 0,
            first_scn: SCN_NONE,
            last_scn: SCN_NONE,
            commit_time: 0,
            is_begin: false,
            is_commit: false,
            is_rollback: false,
            shutdown: false,
            op_codes: 0,
            chunks: ChunkChain::new(),
            splits: SplitBlockList::new(),
        }
    }

    pub fn op_codes(&self) -> u64 {
        self.op_codes
    }

    pub fn split_blocks_pending(&self) -> usize {
        self.splits.len()
    }

    /// The backing chunk store (diagnostics, tests).
    pub fn chunk_chain(&self) -> &ChunkChain {
        &self.chunks
    }

    pub fn heap_key(&self) -> HeapKey {
        HeapKey {
            is_commit: self.is_commit,
            last_scn: self.last_scn,
            xid: self.xid,
        }
    }

    /// Mark the begin-transaction record.
    pub fn begin(&mut self, scn: Scn, sequence: Seq) {
        self.is_begin = true;
        self.touch(scn, sequence);
    }

    fn touch(&mut self, scn: Scn, sequence: Seq) {
        if self.first_sequence == 0 || self.first_sequence > sequence {
            self.first_sequence = sequence;
        }
        if self.first_scn == SCN_NONE || self.first_scn > scn {
            self.first_scn = scn;
        }
        if self.last_scn == SCN_NONE || self.last_scn < scn {
            self.last_scn = scn;
        }
    }

    /// Store a fully assembled undo/redo pair.
    pub fn add(
        &mut self,
        pool: &MemoryPool,
        rec1: &RedoRecord,
        rec2: &RedoRecord,
        sequence: Seq,
        scn: Scn,
    ) -> Result<()> {
        ensure!(
            !self.is_commit,
            "transaction {} already committed, record at scn {} rejected",
            self.xid,
            scn
        );
        self.store(pool, rec1, rec2, sequence, scn)
    }

    // Also reached by the split merge, which runs inside the commit flush
    // after is_commit is already set.
    fn store(
        &mut self,
        pool: &MemoryPool,
        rec1: &RedoRecord,
        rec2: &RedoRecord,
        sequence: Seq,
        scn: Scn,
    ) -> Result<()> {
        self.chunks
            .add(pool, combined_op(rec1, rec2), rec1, rec2, scn)?;
        self.op_codes += 1;
        self.touch(scn, sequence);
        Ok(())
    }

    /// Park a multi-block UNDO fragment until the merge runs.
    pub fn add_split_block(&mut self, rec1: RedoRecord, rec2: Option<RedoRecord>) {
        trace!(xid = %self.xid, scn = rec1.scn, flg = rec1.flg, "split fragment parked");
        self.splits.insert(rec1, rec2);
    }

    /// Identity of the most recent stored operation, for the last-op index.
    pub fn last_op_key(&self) -> Result<Option<LastOpKey>> {
        Ok(self.chunks.last_pair()?.map(|p| LastOpKey::of(&p.rec1)))
    }

    /// Whether a rollback pair cancels the most recent stored operation.
    pub fn matches_last(&self, rb1: &RedoRecord, rb2: &RedoRecord) -> Result<bool> {
        match self.chunks.last_pair()? {
            Some(pair) => Ok(matches_for_rollback(&pair.rec1, &pair.rec2, rb1, rb2)),
            None => Ok(false),
        }
    }

    /// Fast path: undo the most recent stored operation.
    pub fn rollback_last_op(&mut self, pool: &MemoryPool, scn: Scn) -> Result<()> {
        self.chunks.rollback_last(pool)?;
        self.op_codes -= 1;
        if self.last_scn == SCN_NONE || self.last_scn < scn {
            self.last_scn = scn;
        }
        Ok(())
    }

    /// Undo a prior stored operation matched from the tail. Returns whether
    /// a match was found.
    pub fn rollback_part_op(
        &mut self,
        pool: &MemoryPool,
        rb1: &RedoRecord,
        rb2: &RedoRecord,
        scn: Scn,
    ) -> Result<bool> {
        if !self.chunks.delete_part(pool, rb1, rb2)? {
            return Ok(false);
        }
        self.op_codes -= 1;
        if self.last_scn == SCN_NONE || self.last_scn < scn {
            self.last_scn = scn;
        }
        Ok(true)
    }

    /// Merge every pending multi-block fragment group and store the results.
    /// Runs before any commit flush.
    pub fn flush_split_blocks(
        &mut self,
        pool: &MemoryPool,
        indices: &mut AssemblyIndices,
    ) -> Result<()> {
        if self.splits.is_empty() {
            return Ok(());
        }
        trace!(xid = %self.xid, pending = self.splits.len(), "merging split blocks");

        for group in self.splits.drain_groups() {
            let (rec1, rec2) = split::merge_group(group)?;

            if indices.rollbacks.take_matching(&rec1, &rec2) {
                trace!(xid = %self.xid, scn = rec1.scn, "merged undo record already rolled back");
                continue;
            }

            if self.op_codes > 0 {
                if let Some(key) = self.last_op_key()? {
                    indices.last_op.erase(&key);
                }
            }
            let key = LastOpKey::of(&rec1);
            let scn = rec1.scn;
            let sequence = self.first_sequence;
            self.store(pool, &rec1, &rec2, sequence, scn)?;
            indices.heap.update(self.heap_key());
            indices.last_op.set(key, self.xid);
            trace!(xid = %self.xid, scn, "split blocks merged and stored");
        }
        Ok(())
    }

    /// Flush the committed transaction: walk every stored pair in insertion
    /// order, assemble row-piece chains, and emit framed DML events.
    pub fn flush(
        &mut self,
        pool: &MemoryPool,
        indices: &mut AssemblyIndices,
        out: &mut OutputBuffer,
        fmt: &mut dyn Formatter,
    ) -> Result<()> {
        self.flush_split_blocks(pool, indices)?;

        if self.op_codes == 0 || self.is_rollback {
            self.chunks.clear(pool);
            return Ok(());
        }
        trace!(xid = %self.xid, "{}", self);

        if let Some(key) = self.last_op_key()? {
            indices.last_op.erase(&key);
        }

        fmt.begin(out, self.last_scn, self.commit_time, self.xid)?;

        let mut arena: Vec<Piece> = Vec::new();
        let mut first: Option<usize> = None;
        let mut last: Option<usize> = None;
        let mut kind: Option<DmlKind> = None;
        let mut prev_scn: Scn = 0;

        for pair in self.chunks.frames() {
            if self.shutdown {
                break;
            }
            let mut pair = pair?;

            if prev_scn != 0 && prev_scn > pair.scn {
                warn!(
                    xid = %self.xid,
                    prev = prev_scn,
                    scn = pair.scn,
                    "SCN swap inside transaction"
                );
            }

            let mut op_flush = false;
            match pair.op {
                op if is_row_piece(op) => {
                    pair.rec2.supp_log_after = pair.rec1.supp_log_after;

                    kind = Some(match kind {
                        None => match op {
                            OP_ROW_INSERT => DmlKind::Insert,
                            OP_ROW_DELETE => DmlKind::Delete,
                            _ => DmlKind::Update,
                        },
                        Some(DmlKind::Insert)
                            if matches!(
                                op,
                                OP_ROW_DELETE
                                    | OP_ROW_UPDATE
                                    | OP_ROW_OVERWRITE
                                    | OP_ROW_FORWARD
                            ) =>
                        {
                            DmlKind::Update
                        }
                        Some(DmlKind::Delete)
                            if matches!(
                                op,
                                OP_ROW_INSERT
                                    | OP_ROW_UPDATE
                                    | OP_ROW_OVERWRITE
                                    | OP_ROW_FORWARD
                            ) =>
                        {
                            DmlKind::Update
                        }
                        Some(k) => k,
                    });

                    ensure!(
                        pair.rec1.supp_log_type != 0,
                        "SUPPLEMENTAL_LOG_DATA_MIN missing\n\
                         HINT run: ALTER DATABASE ADD SUPPLEMENTAL LOG DATA;\n\
                         HINT run: ALTER SYSTEM ARCHIVE LOG CURRENT;"
                    );

                    let emit = pair.rec1.supp_log_fb & FB_L != 0;
                    let idx = arena.len();
                    arena.push(Piece {
                        rec1: pair.rec1,
                        rec2: pair.rec2,
                        prev: None,
                        next: None,
                    });

                    match (first, last) {
                        (None, _) => {
                            first = Some(idx);
                            last = Some(idx);
                        }
                        (Some(head), Some(tail)) => {
                            let ok = arena[tail].rec1.supp_log_bdba == arena[idx].rec1.supp_log_bdba
                                && arena[tail].rec1.supp_log_slot == arena[idx].rec1.supp_log_slot
                                && arena[head].rec1.obj == arena[idx].rec1.obj
                                && arena[head].rec2.obj == arena[idx].rec2.obj;
                            ensure!(ok, "next BDBA/SLOT does not match");

                            if kind == Some(DmlKind::Insert) {
                                arena[idx].next = Some(head);
                                arena[head].prev = Some(idx);
                                first = Some(idx);
                            } else if pair.op == OP_ROW_OVERWRITE
                                && arena[tail].rec2.op_code == SUB_ROW_INSERT
                            {
                                // keep the insert piece as the true tail
                                match arena[tail].prev {
                                    None => {
                                        first = Some(idx);
                                        arena[idx].next = Some(tail);
                                        arena[tail].prev = Some(idx);
                                    }
                                    Some(before_tail) => {
                                        arena[idx].prev = Some(before_tail);
                                        arena[idx].next = Some(tail);
                                        arena[before_tail].next = Some(idx);
                                        arena[tail].prev = Some(idx);
                                    }
                                }
                            } else {
                                arena[tail].next = Some(idx);
                                arena[idx].prev = Some(tail);
                                last = Some(idx);
                            }
                        }
                        (Some(_), None) => unreachable!("first and last move together"),
                    }

                    if emit {
                        let chain = collect_chain(&arena, first);
                        let k = kind.expect("kind set on first piece");
                        fmt.dml(out, &chain, k)?;
                        op_flush = true;
                    }
                }
                OP_INSERT_MULTIPLE => {
                    fmt.insert_multiple(out, &pair.rec1, &pair.rec2)?;
                    op_flush = true;
                }
                OP_DELETE_MULTIPLE => {
                    fmt.delete_multiple(out, &pair.rec1, &pair.rec2)?;
                    op_flush = true;
                }
                OP_TRUNCATE => {
                    fmt.ddl(out, &pair.rec1)?;
                    op_flush = true;
                }
                op => bail!("unknown opcode 0x{:08x} in committed transaction", op),
            }

            // divide very big transactions at row boundaries
            let max_mb = fmt.max_message_mb();
            if max_mb > 0
                && out.current_message_size() + DATA_BUFFER_SIZE > max_mb as usize * 1024 * 1024
            {
                warn!(
                    xid = %self.xid,
                    bytes = out.current_message_size(),
                    "big transaction divided (forced commit)"
                );
                fmt.commit(out)?;
                fmt.begin(out, self.last_scn, self.commit_time, self.xid)?;
            }

            if op_flush {
                arena.clear();
                first = None;
                last = None;
                kind = None;
            }
            prev_scn = pair.scn;
        }

        fmt.commit(out)?;

        self.chunks.clear(pool);
        self.op_codes = 0;
        Ok(())
    }
}

fn collect_chain<'a>(
    arena: &'a [Piece],
    first: Option<usize>,
) -> SmallVec<[(&'a RedoRecord, &'a RedoRecord); 8]> {
    let mut chain = SmallVec::new();
    let mut cursor = first;
    while let Some(idx) = cursor {
        chain.push((&arena[idx].rec1, &arena[idx].rec2));
        cursor = arena[idx].next;
    }
    chain
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scn: {}-{} xid: {} flags: {}/{}/{} op: {} chunks: {} sz: {}",
            self.first_scn,
            self.last_scn,
            self.xid,
            self.is_begin as u8,
            self.is_commit as u8,
            self.is_rollback as u8,
            self.op_codes,
            self.chunks.chunk_count(),
            self.chunks.total_size()
        )
    }
}
