//! # Redo Record Model
//!
//! Parsed redo-log records as delivered by the upstream byte-level parser,
//! plus the opcode vocabulary the assembly core understands.
//!
//! A redo-log record arrives in pairs: the undo vector (layer 5.1) and its
//! companion redo vector (layer 11.x row operation, or a DDL marker). The
//! assembly core never touches redo files or raw block bytes; everything here
//! operates on [`RedoRecord`] values that already carry their decoded header
//! fields and an owned payload.
//!
//! ## Module Organization
//!
//! - [`record`]: the record value, flag bits, and its fixed binary metadata
//!   frame used by the chunk store
//! - [`opcode`]: opcode constants and the undo post-parse that recomputes
//!   derived offsets after a multi-block merge

pub mod opcode;
pub mod record;

pub use record::{RedoRecord, Scn, Seq, SubScn, Time, Uba, Xid, SCN_NONE};
