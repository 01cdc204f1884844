//! # Memory Pool
//!
//! Fixed-size chunk pool backing the transaction chunk store and the output
//! buffer. Both subsystems draw `MEMORY_CHUNK_SIZE` buffers from one shared
//! pool so total memory stays bounded regardless of transaction size.
//!
//! ## Enforcement Model
//!
//! The pool enforces a **hard limit**: an acquisition that would exceed the
//! configured chunk ceiling is refused with an error rather than growing the
//! process. The analyser loop treats that error as fatal for the session.

pub mod pool;

pub use pool::{MemChunk, MemoryPool};
