//! # Assembly Engine
//!
//! The façade the redo parser feeds: it owns every open [`Transaction`], the
//! commit-ordering heap, the rollback indices, the memory pool, and the
//! output stage, and routes each parsed record to the right place.
//!
//! ## Record Routing
//!
//! ```text
//! op(xid, r1, r2)
//!   ├─ multi-block fragment ──> transaction split list (merged at flush)
//!   ├─ matched by a parked rollback ──> dropped
//!   └─ otherwise ──> chunk store, last-op index, heap re-key
//!
//! rollback_op(xid, rb1, rb2)
//!   ├─ cancels the tail of its transaction ──> rollback_last_op
//!   ├─ cancels an interior operation ──> rollback_part_op (splice)
//!   ├─ tail of another indexed transaction ──> that transaction
//!   └─ target not stored yet ──> parked on the rollback list
//! ```
//!
//! `flush_committed` pops committed transactions in `(last_scn, xid)` order
//! and flushes each through the formatter into the output buffer.
//!
//! The engine runs on the analyser thread; only the output buffer's handover
//! state is shared with the writer.

use eyre::{bail, Result};
use hashbrown::HashMap;
use std::sync::Arc;
use tracing::{info, trace, warn};

use crate::memory::MemoryPool;
use crate::output::{Formatter, OutputBuffer, OutputReader};
use crate::redo::{RedoRecord, Scn, Seq, Time, Xid};
use crate::txn::{AssemblyIndices, LastOpKey, Transaction};

pub struct Engine {
    pool: Arc<MemoryPool>,
    out: OutputBuffer,
    fmt: Box<dyn Formatter>,
    txs: HashMap<Xid, Transaction>,
    indices: AssemblyIndices,
}

impl Engine {
    pub fn new(pool: Arc<MemoryPool>, out: OutputBuffer, fmt: Box<dyn Formatter>) -> Self {
        Self {
            pool,
            out,
            fmt,
            txs: HashMap::new(),
            indices: AssemblyIndices::new(),
        }
    }

    /// Consumer half of the output buffer, for the writer thread.
    pub fn reader(&self) -> OutputReader {
        self.out.reader()
    }

    /// Resolve the configured NLS defaults by Oracle name.
    pub fn set_nls_charset(&mut self, nls_charset: &str, nls_nchar_charset: &str) -> Result<()> {
        self.out.set_nls_charset(nls_charset, nls_nchar_charset)
    }

    pub fn open_transactions(&self) -> usize {
        self.txs.len()
    }

    /// State of an open transaction, if any.
    pub fn transaction(&self, xid: Xid) -> Option<&Transaction> {
        self.txs.get(&xid)
    }

    /// Begin-transaction record.
    pub fn begin(&mut self, xid: Xid, scn: Scn, sequence: Seq) {
        let tx = self
            .txs
            .entry(xid)
            .or_insert_with(|| Transaction::new(xid));
        tx.begin(scn, sequence);
        self.indices.heap.update(tx.heap_key());
        trace!(%xid, scn, "transaction begin");
    }

    /// Route one parsed undo/redo pair. A lone record is accepted only for
    /// multi-block fragments still awaiting their companion.
    pub fn op(
        &mut self,
        xid: Xid,
        sequence: Seq,
        rec1: RedoRecord,
        rec2: Option<RedoRecord>,
    ) -> Result<()> {
        let tx = self
            .txs
            .entry(xid)
            .or_insert_with(|| Transaction::new(xid));

        if rec1.is_multi_block_undo() {
            tx.add_split_block(rec1, rec2);
            self.indices.heap.update(tx.heap_key());
            return Ok(());
        }
        let Some(rec2) = rec2 else {
            bail!("record at scn {} has no companion redo record", rec1.scn);
        };

        if self.indices.rollbacks.take_matching(&rec1, &rec2) {
            trace!(%xid, scn = rec1.scn, "record cancelled by parked rollback");
            self.indices.heap.update(tx.heap_key());
            return Ok(());
        }

        if tx.op_codes() > 0 {
            if let Some(key) = tx.last_op_key()? {
                self.indices.last_op.erase(&key);
            }
        }
        let key = LastOpKey::of(&rec1);
        let scn = rec1.scn;
        tx.add(&self.pool, &rec1, &rec2, sequence, scn)?;
        self.indices.last_op.set(key, xid);
        self.indices.heap.update(tx.heap_key());
        Ok(())
    }

    /// Route a partial-rollback record pair.
    pub fn rollback_op(&mut self, xid: Xid, rb1: RedoRecord, rb2: RedoRecord) -> Result<()> {
        let scn = rb2.scn;

        if self.try_rollback_in(xid, &rb1, &rb2, scn)? {
            return Ok(());
        }

        // the tail of some other open transaction may match
        if let Some(other) = self.indices.last_op.find_for_rollback(&rb1, &rb2) {
            if other != xid && self.try_rollback_in(other, &rb1, &rb2, scn)? {
                return Ok(());
            }
        }

        trace!(%xid, scn, "rollback target not stored yet, parked");
        self.indices.rollbacks.park(rb1, rb2);
        Ok(())
    }

    fn try_rollback_in(
        &mut self,
        xid: Xid,
        rb1: &RedoRecord,
        rb2: &RedoRecord,
        scn: Scn,
    ) -> Result<bool> {
        let Some(tx) = self.txs.get_mut(&xid) else {
            return Ok(false);
        };

        if tx.matches_last(rb1, rb2)? {
            if let Some(key) = tx.last_op_key()? {
                self.indices.last_op.erase(&key);
            }
            tx.rollback_last_op(&self.pool, scn)?;
            if let Some(key) = tx.last_op_key()? {
                self.indices.last_op.set(key, xid);
            }
            self.indices.heap.update(tx.heap_key());
            return Ok(true);
        }

        if tx.rollback_part_op(&self.pool, rb1, rb2, scn)? {
            self.indices.heap.update(tx.heap_key());
            return Ok(true);
        }
        Ok(false)
    }

    /// Commit record: mark the transaction and leave it for
    /// [`Engine::flush_committed`].
    pub fn commit(&mut self, xid: Xid, scn: Scn, time: Time) {
        let Some(tx) = self.txs.get_mut(&xid) else {
            warn!(%xid, scn, "commit for unknown transaction");
            return;
        };
        if !tx.is_begin {
            warn!(%xid, scn, "commit without begin");
        }
        tx.is_commit = true;
        tx.commit_time = time;
        if tx.last_scn == crate::redo::SCN_NONE || tx.last_scn < scn {
            tx.last_scn = scn;
        }
        self.indices.heap.update(tx.heap_key());
    }

    /// Rollback record: the whole transaction is discarded at flush time.
    pub fn rollback(&mut self, xid: Xid, scn: Scn) {
        let Some(tx) = self.txs.get_mut(&xid) else {
            warn!(%xid, scn, "rollback for unknown transaction");
            return;
        };
        tx.is_commit = true;
        tx.is_rollback = true;
        if tx.last_scn == crate::redo::SCN_NONE || tx.last_scn < scn {
            tx.last_scn = scn;
        }
        self.indices.heap.update(tx.heap_key());
    }

    /// Flush every committed transaction in commit-SCN order. Returns how
    /// many were flushed.
    pub fn flush_committed(&mut self) -> Result<usize> {
        let mut flushed = 0;
        loop {
            let Some(key) = self.indices.heap.peek_min().copied() else {
                break;
            };
            if !key.is_commit {
                break;
            }
            self.indices.heap.pop_min();

            let Some(mut tx) = self.txs.remove(&key.xid) else {
                continue;
            };
            if let Some(last) = tx.last_op_key()? {
                self.indices.last_op.erase(&last);
            }
            tx.flush(&self.pool, &mut self.indices, &mut self.out, self.fmt.as_mut())?;
            flushed += 1;
        }
        if flushed > 0 {
            info!(flushed, open = self.txs.len(), "committed transactions flushed");
        }
        Ok(flushed)
    }

    /// Stop in-progress work at the next record boundary and wake the writer
    /// for teardown.
    pub fn shutdown(&mut self) {
        for tx in self.txs.values_mut() {
            tx.shutdown = true;
        }
        self.out.shutdown();
    }
}
