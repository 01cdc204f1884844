//! # Commit-Ordering Heap
//!
//! Min-heap over active transactions deciding which transaction flushes
//! next. Committed transactions sort before uncommitted ones, then by
//! `last_scn`, then by xid as the tie-breaker, so the flush order across
//! transactions follows commit SCN order.
//!
//! Keys change while a transaction assembles (`last_scn` rises, the commit
//! flag flips), so the heap supports keyed `update` and `remove`; positions
//! are tracked internally by xid.

use hashbrown::HashMap;
use std::cmp::Ordering;

use crate::redo::{Scn, Xid};

/// Ordering key of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapKey {
    pub is_commit: bool,
    pub last_scn: Scn,
    pub xid: Xid,
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_commit, other.is_commit) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self
                .last_scn
                .cmp(&other.last_scn)
                .then(self.xid.cmp(&other.xid)),
        }
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Binary min-heap with xid-keyed position tracking.
#[derive(Debug, Default)]
pub struct TransactionHeap {
    entries: Vec<HeapKey>,
    pos: HashMap<Xid, usize>,
}

impl TransactionHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a transaction. A second push for the same xid replaces its key.
    pub fn push(&mut self, key: HeapKey) {
        if self.pos.contains_key(&key.xid) {
            self.update(key);
            return;
        }
        let idx = self.entries.len();
        self.entries.push(key);
        self.pos.insert(key.xid, idx);
        self.sift_up(idx);
    }

    /// Re-key an existing entry after its `last_scn` or commit flag changed.
    pub fn update(&mut self, key: HeapKey) {
        let Some(&idx) = self.pos.get(&key.xid) else {
            self.push(key);
            return;
        };
        self.entries[idx] = key;
        let idx = self.sift_up(idx);
        self.sift_down(idx);
    }

    pub fn peek_min(&self) -> Option<&HeapKey> {
        self.entries.first()
    }

    pub fn pop_min(&mut self) -> Option<HeapKey> {
        if self.entries.is_empty() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.entries.swap(0, last);
        let key = self.entries.pop().expect("non-empty checked above");
        self.pos.remove(&key.xid);
        if !self.entries.is_empty() {
            self.pos.insert(self.entries[0].xid, 0);
            self.sift_down(0);
        }
        Some(key)
    }

    /// Remove a transaction wherever it sits. Returns whether it was present.
    pub fn remove(&mut self, xid: Xid) -> bool {
        let Some(idx) = self.pos.remove(&xid) else {
            return false;
        };
        let last = self.entries.len() - 1;
        if idx != last {
            self.entries.swap(idx, last);
            self.entries.pop();
            self.pos.insert(self.entries[idx].xid, idx);
            let idx = self.sift_up(idx);
            self.sift_down(idx);
        } else {
            self.entries.pop();
        }
        true
    }

    fn sift_up(&mut self, mut idx: usize) -> usize {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.entries[idx] >= self.entries[parent] {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
        idx
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let mut smallest = idx;
            for child in [2 * idx + 1, 2 * idx + 2] {
                if child < self.entries.len() && self.entries[child] < self.entries[smallest] {
                    smallest = child;
                }
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.pos.insert(self.entries[a].xid, a);
        self.pos.insert(self.entries[b].xid, b);
    }
}
