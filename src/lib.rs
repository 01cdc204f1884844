//! # redorelay - Oracle Redo Transaction Assembly
//!
//! redorelay is the transaction-assembly core of a change-data-capture
//! pipeline for Oracle redo streams. It takes parsed redo records from an
//! upstream byte-level parser, reconstructs logical transactions, and emits
//! committed row-level changes as framed messages for a downstream writer.
//! The implementation prioritizes:
//!
//! - **Bounded memory**: chunk-linked buffers from a shared pool back
//!   arbitrarily large transactions
//! - **Exact pairing discipline**: every stored operation is an undo/redo
//!   pair, matchable by later rollback records
//! - **Safe handover**: a mutex + condvar protocol moves produced bytes to
//!   the writer thread without copying inside the lock
//!
//! ## Quick Start
//!
//! ```ignore
//! use redorelay::{Engine, FormatOptions, JsonFormatter, MemoryPool, OutputBuffer};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(MemoryPool::default());
//! let out = OutputBuffer::new(pool.clone())?;
//! let fmt = Box::new(JsonFormatter::new(FormatOptions::default()));
//! let mut engine = Engine::new(pool, out, fmt);
//!
//! let mut reader = engine.reader();
//! std::thread::spawn(move || {
//!     while let Some(message) = reader.next_message() {
//!         sink.write(&message);
//!     }
//! });
//!
//! engine.begin(xid, scn, sequence);
//! engine.op(xid, sequence, undo_record, Some(redo_record))?;
//! engine.commit(xid, commit_scn, commit_time);
//! engine.flush_committed()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Engine (record routing)         │
//! ├──────────────────────┬──────────────────┤
//! │ Transaction          │ Assembly indices  │
//! │  chunk store         │  commit heap      │
//! │  split-block merge   │  last-op map      │
//! │  rollback matching   │  rollback list    │
//! ├──────────────────────┴──────────────────┤
//! │     Formatter (JSON, pluggable)          │
//! ├─────────────────────────────────────────┤
//! │  OutputBuffer  ──handover──>  writer     │
//! ├─────────────────────────────────────────┤
//! │        MemoryPool (chunk recycling)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Threading
//!
//! The analyser thread owns the engine, every transaction, and the producer
//! half of the output buffer. One writer thread per sink blocks on the
//! buffer's condition variable and drains complete messages. The memory pool
//! is shared by both.
//!
//! ## Out of Scope
//!
//! The redo-file reader, the byte-level opcode parser, the schema resolver,
//! and the transport writers live in the surrounding processes; this crate
//! begins at parsed [`redo::RedoRecord`] values and ends at framed message
//! bytes.
//!
//! ## Module Overview
//!
//! - [`engine`]: record routing and commit-ordered flushing
//! - [`txn`]: transaction state, chunk store, split merge, rollback indices
//! - [`output`]: message buffer, handover protocol, formatters, dictionaries
//! - [`redo`]: the parsed record model and opcode vocabulary
//! - [`memory`]: the shared chunk pool
//! - [`config`]: recognized options and layout constants

pub mod config;
pub mod engine;
pub mod memory;
pub mod output;
pub mod redo;
pub mod txn;

pub use config::FormatOptions;
pub use engine::Engine;
pub use memory::MemoryPool;
pub use output::{JsonFormatter, OutputBuffer, OutputReader};
pub use redo::{RedoRecord, Scn, Xid};
pub use txn::Transaction;
