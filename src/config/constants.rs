//! # Configuration Constants
//!
//! This module centralizes the size and layout constants shared between the
//! transaction chunk store, the output buffer, and the memory pool. Constants
//! that depend on each other are co-located to prevent mismatch bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! MEMORY_CHUNK_SIZE (1 MiB)
//!       │
//!       ├─> TransactionChunk capacity (one pool chunk per link)
//!       │     A stored record pair must fit in a single chunk; pairs larger
//!       │     than MEMORY_CHUNK_SIZE - ROW_HEADER_TOTAL are rejected.
//!       │
//!       ├─> OutputBuffer chunk capacity (one pool chunk per link)
//!       │
//!       └─> DATA_BUFFER_SIZE (guard band for the oversize-message check)
//!
//! MESSAGE_LENGTH_SIZE (8 bytes)
//!       │
//!       └─> message framing: [u64 length][payload][pad to 8]
//!           MEMORY_CHUNK_SIZE must be a multiple of 8 so the length prefix
//!           never straddles a chunk boundary (write positions stay 8-aligned).
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `MEMORY_CHUNK_SIZE % 8 == 0` (length prefixes never straddle chunks)
//! 2. `DATA_BUFFER_SIZE <= MEMORY_CHUNK_SIZE` (guard band cannot exceed a chunk)

// ============================================================================
// MEMORY POOL CONFIGURATION
// ============================================================================

/// Size of one pool chunk in bytes. This is the unit of allocation for both
/// the transaction chunk store and the output buffer.
pub const MEMORY_CHUNK_SIZE: usize = 1024 * 1024;

/// Number of chunks pre-allocated when a pool is created.
pub const DEFAULT_POOL_MIN_CHUNKS: usize = 8;

/// Hard ceiling on the number of chunks a pool will hand out. Exceeding it is
/// the fatal allocation failure surfaced to the analyser loop.
pub const DEFAULT_POOL_MAX_CHUNKS: usize = 1024;

// ============================================================================
// MESSAGE FRAMING
// ============================================================================

/// Size of the length prefix reserved at the start of every output message.
pub const MESSAGE_LENGTH_SIZE: usize = 8;

/// Guard band added to the current message size when deciding whether a big
/// transaction must be divided at the next DML boundary.
pub const DATA_BUFFER_SIZE: usize = MEMORY_CHUNK_SIZE;

const _: () = assert!(
    MEMORY_CHUNK_SIZE % 8 == 0,
    "MEMORY_CHUNK_SIZE must be 8-byte aligned so length prefixes never straddle chunks"
);

const _: () = assert!(
    DATA_BUFFER_SIZE <= MEMORY_CHUNK_SIZE,
    "oversize guard band cannot exceed a single chunk"
);

/// Round `n` up to the next 4-byte boundary. Redo field payloads are stored
/// 4-byte aligned; all split-merge copy arithmetic goes through this.
#[inline]
pub const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Round `n` up to the next 8-byte boundary (message padding).
#[inline]
pub const fn align8(n: usize) -> usize {
    (n + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align4_rounds_up() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(5), 8);
    }

    #[test]
    fn align8_rounds_up() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(7), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(9), 16);
    }
}
