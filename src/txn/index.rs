//! # Assembly Indices
//!
//! Engine-global lookup structures consulted while transactions assemble:
//!
//! - [`LastOpIndex`] maps the tail operation of every open transaction to its
//!   xid, so a partial-rollback record can find the transaction whose most
//!   recent store it undoes without scanning every chunk chain.
//! - [`RollbackList`] parks rollback records that arrived before the
//!   operation they cancel; newly stored (or newly merged) pairs are checked
//!   against it and silently dropped on a match.
//!
//! Both are touched by the analyser thread only.

use hashbrown::HashMap;

use super::heap::TransactionHeap;
use super::transaction::matches_for_rollback;
use crate::redo::{RedoRecord, Uba, Xid};

/// The engine-global indices threaded through assembly: the commit-ordering
/// heap, the last-operation map, and the orphaned-rollback list.
#[derive(Default)]
pub struct AssemblyIndices {
    pub heap: TransactionHeap,
    pub last_op: LastOpIndex,
    pub rollbacks: RollbackList,
}

impl AssemblyIndices {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Identity of a transaction's most recent stored operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LastOpKey {
    pub slt: u8,
    pub rci: u8,
    pub uba: Uba,
}

impl LastOpKey {
    /// Key of a stored undo record.
    pub fn of(rec1: &RedoRecord) -> Self {
        Self {
            slt: rec1.slt,
            rci: rec1.rci,
            uba: rec1.uba,
        }
    }

    /// Key a rollback pair would match: the rollback record carries the
    /// target's slot and chain index on the redo side and its undo address on
    /// the undo side.
    pub fn of_rollback(rb1: &RedoRecord, rb2: &RedoRecord) -> Self {
        Self {
            slt: rb2.slt,
            rci: rb2.rci,
            uba: rb1.uba,
        }
    }
}

/// Map from last stored operation to owning transaction.
#[derive(Debug, Default)]
pub struct LastOpIndex {
    map: HashMap<LastOpKey, Xid>,
}

impl LastOpIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: LastOpKey, xid: Xid) {
        self.map.insert(key, xid);
    }

    pub fn erase(&mut self, key: &LastOpKey) {
        self.map.remove(key);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Transaction whose tail operation a rollback pair targets, if indexed.
    pub fn find_for_rollback(&self, rb1: &RedoRecord, rb2: &RedoRecord) -> Option<Xid> {
        self.map.get(&LastOpKey::of_rollback(rb1, rb2)).copied()
    }
}

/// Rollback records waiting for their target operation to arrive.
#[derive(Debug, Default)]
pub struct RollbackList {
    pending: Vec<(RedoRecord, RedoRecord)>,
}

impl RollbackList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn park(&mut self, rb1: RedoRecord, rb2: RedoRecord) {
        self.pending.push((rb1, rb2));
    }

    /// If a parked rollback cancels the pair, consume it and report a match.
    pub fn take_matching(&mut self, rec1: &RedoRecord, rec2: &RedoRecord) -> bool {
        let hit = self
            .pending
            .iter()
            .position(|(rb1, rb2)| matches_for_rollback(rec1, rec2, rb1, rb2));
        match hit {
            Some(idx) => {
                self.pending.swap_remove(idx);
                true
            }
            None => false,
        }
    }
}
