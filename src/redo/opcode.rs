//! # Opcode Vocabulary
//!
//! Combined opcodes as stored in the chunk store: the undo vector's code in
//! the high half, the companion redo vector's code in the low half. The flush
//! walk dispatches on these; anything else in a committed transaction is a
//! parser bug and fatal.
//!
//! The undo post-parse ([`reprocess_undo`]) recomputes the derived offsets of
//! a layer-5.1 record from its payload. It runs once when the parser first
//! sees the record, and again after a multi-block merge rewrites the payload.

use eyre::{ensure, Result};

use super::record::{read_u16, RedoRecord};
use crate::config::align4;

/// Insert row piece.
pub const OP_ROW_INSERT: u32 = 0x0501_0B02;
/// Delete row piece.
pub const OP_ROW_DELETE: u32 = 0x0501_0B03;
/// Update row piece.
pub const OP_ROW_UPDATE: u32 = 0x0501_0B05;
/// Overwrite row piece.
pub const OP_ROW_OVERWRITE: u32 = 0x0501_0B06;
/// Change row forwarding address.
pub const OP_ROW_FORWARD: u32 = 0x0501_0B08;
/// Supplemental log record for update.
pub const OP_ROW_SUPP_LOG: u32 = 0x0501_0B10;
/// Multi-row insert, self-contained.
pub const OP_INSERT_MULTIPLE: u32 = 0x0501_0B0B;
/// Multi-row delete, self-contained.
pub const OP_DELETE_MULTIPLE: u32 = 0x0501_0B0C;
/// Truncate table (DDL).
pub const OP_TRUNCATE: u32 = 0x1801_0000;

/// Redo-side subtype for an insert row piece, used by the overwrite placement
/// rule during chain assembly.
pub const SUB_ROW_INSERT: u32 = 0x0B02;

/// Byte offset of the flag word inside the undo-block header (field 2 of a
/// layer-5.1 record).
pub const UNDO_BLOCK_FLG_OFFSET: usize = 20;

/// Combined opcode of an undo/redo pair.
#[inline]
pub fn combined_op(rec1: &RedoRecord, rec2: &RedoRecord) -> u32 {
    (rec1.op_code << 16) | rec2.op_code
}

/// Whether the combined opcode is a row-piece operation that participates in
/// chain assembly.
#[inline]
pub fn is_row_piece(op: u32) -> bool {
    matches!(
        op,
        OP_ROW_INSERT
            | OP_ROW_DELETE
            | OP_ROW_UPDATE
            | OP_ROW_OVERWRITE
            | OP_ROW_FORWARD
            | OP_ROW_SUPP_LOG
    )
}

/// Recompute the derived offsets of a layer-5.1 undo record from its payload:
/// the field data position from the field-length table, and the multi-block
/// flag word from the undo-block header in field 2.
pub fn reprocess_undo(rec: &mut RedoRecord) -> Result<()> {
    let delta = rec.field_lengths_delta as usize;
    ensure!(
        delta + 2 <= rec.data.len(),
        "undo record too short for field table: {} bytes, table at {}",
        rec.data.len(),
        delta
    );

    let field_cnt = read_u16(&rec.data, delta);
    ensure!(
        delta + 2 * (field_cnt as usize + 1) <= rec.data.len(),
        "undo record field table truncated: {} entries at {}",
        field_cnt,
        delta
    );
    ensure!(field_cnt >= 2, "undo record missing header fields");

    rec.field_cnt = field_cnt;
    rec.field_pos = (delta + align4((field_cnt as usize + 1) * 2)) as u16;

    let flg_range = rec.field_range(2);
    ensure!(
        flg_range.end - flg_range.start >= UNDO_BLOCK_FLG_OFFSET + 2
            && flg_range.end <= rec.data.len(),
        "undo-block header too short in field 2"
    );
    rec.flg = read_u16(&rec.data, flg_range.start + UNDO_BLOCK_FLG_OFFSET);

    Ok(())
}
