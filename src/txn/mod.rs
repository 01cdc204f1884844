//! # Transaction Assembly
//!
//! Everything between the parsed record stream and the output buffer: the
//! per-transaction chunk store, multi-block UNDO reassembly, rollback
//! resolution, and the commit flush that turns stored frames into logical
//! DML events.
//!
//! ## Data Flow
//!
//! ```text
//!                    parsed (undo, redo) pairs
//!                              │
//!                              ▼
//!                    ┌───────────────────┐
//!   multi-block ────>│    Transaction    │<──── rollback records
//!   fragments        │                   │
//!        │           │  ChunkChain       │  matched against the tail
//!        ▼           │  (byte frames)    │  (fast path) or spliced out
//!   SplitBlockList   └─────────┬─────────┘  (delete_part)
//!   merge on flush             │ commit
//!                              ▼
//!                     row-piece chains ──> Formatter ──> OutputBuffer
//! ```
//!
//! ## Ownership
//!
//! A transaction is owned and mutated by the analyser thread alone; the
//! engine-global indices ([`index::AssemblyIndices`]) are equally
//! single-threaded. No locks are involved until bytes reach the output
//! buffer.

pub mod chunk;
pub mod heap;
pub mod index;
pub mod split;
pub mod transaction;

pub use chunk::{ChunkChain, StoredPair};
pub use heap::{HeapKey, TransactionHeap};
pub use index::{AssemblyIndices, LastOpIndex, LastOpKey, RollbackList};
pub use split::{SplitBlock, SplitBlockList};
pub use transaction::{matches_for_rollback, Transaction};
