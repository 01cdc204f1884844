//! # Output Stage
//!
//! Everything between the commit flush and the writer thread: the chunked
//! message buffer with its producer/consumer handover, the pluggable event
//! formatters, and the character-set and timezone dictionaries consulted
//! while rendering values.
//!
//! ```text
//!  analyser thread                         writer thread
//!  ───────────────                         ─────────────
//!  Transaction::flush
//!        │ Formatter (JSON, ...)
//!        ▼
//!  OutputBuffer ──[chunk queue + condvar]──> OutputReader ──> sink
//!        ▲                                        │
//!        └────────── MemoryPool <─── drained chunks
//! ```

pub mod buffer;
pub mod charset;
pub mod format;
pub mod timezone;

pub use buffer::{OutputBuffer, OutputReader};
pub use charset::{CharacterDecoder, CharsetRegistry};
pub use format::{DmlKind, Formatter, JsonFormatter};
pub use timezone::timezone_name;
