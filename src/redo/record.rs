//! # Redo Record Value
//!
//! The per-record datum produced by the redo parser. Immutable once parsed,
//! except where split-block merging rewrites the payload of a reassembled
//! record.
//!
//! ## Payload Layout
//!
//! Every record payload follows one contract, shared with the parser and
//! relied on by the split-block merge:
//!
//! ```text
//! [0 .. field_lengths_delta)   opaque record-header region
//! field_lengths_delta:         [field_cnt: u16][len 1: u16] .. [len n: u16]
//! field_pos:                   field 1 .. field n, each padded to 4 bytes
//! ```
//!
//! For layer-5 undo records, field 2 carries the undo-block header; the
//! multi-block flag word lives at byte offset 20 inside it.
//!
//! ## Metadata Frame
//!
//! The chunk store persists records as a fixed metadata frame followed by the
//! raw payload. The frame is a `#[repr(C)]` little-endian struct read and
//! written through zerocopy, so in-flight chunks keep a stable byte layout.
//!
//! ## Chain Links
//!
//! Row-piece chains are linked by arena index during a flush, never by
//! pointer; the arena lives for a single flush iteration.

use zerocopy::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// System Change Number.
pub type Scn = u64;
/// Sub-SCN ordering records inside one SCN.
pub type SubScn = u16;
/// Redo log sequence number.
pub type Seq = u32;
/// Undo byte address.
pub type Uba = u64;
/// Commit timestamp, seconds since the Unix epoch.
pub type Time = u64;

/// Sentinel for an unset SCN bound.
pub const SCN_NONE: Scn = u64::MAX;

/// Multi-block UNDO: this record is the head fragment.
pub const FLG_MULTIBLOCKUNDOHEAD: u16 = 0x0001;
/// Multi-block UNDO: middle fragment.
pub const FLG_MULTIBLOCKUNDOMID: u16 = 0x0002;
/// Multi-block UNDO: tail fragment.
pub const FLG_MULTIBLOCKUNDOTAIL: u16 = 0x0004;
/// The last buffer of this undo record was split mid-field.
pub const FLG_LASTBUFFERSPLIT: u16 = 0x0100;

/// Row-piece flag: last piece of the logical row.
pub const FB_L: u8 = 0x08;

/// Rollback record carries the begin-transaction marker.
pub const OP_FLAGS_BEGIN: u16 = 0x0001;

/// Transaction identifier: undo segment, slot, and wrap packed into 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Xid(pub u64);

impl Xid {
    pub fn new(usn: u16, slt: u16, sqn: u32) -> Self {
        Self(((usn as u64) << 48) | ((slt as u64) << 32) | sqn as u64)
    }

    pub fn usn(&self) -> u16 {
        (self.0 >> 48) as u16
    }

    pub fn slt(&self) -> u16 {
        (self.0 >> 32) as u16
    }

    pub fn sqn(&self) -> u32 {
        self.0 as u32
    }
}

impl std::fmt::Display for Xid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "0x{:04x}.{:03x}.{:08x}",
            self.usn(),
            self.slt(),
            self.sqn()
        )
    }
}

/// A parsed redo-log record.
///
/// `op_code` holds the layer/subtype pair: `0x0501` for the undo vector,
/// `0x0B02`..`0x0B10` for row operations, `0x1801` for DDL markers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedoRecord {
    pub op_code: u32,
    pub scn: Scn,
    pub sub_scn: SubScn,
    pub xid: Xid,
    pub uba: Uba,
    pub dba: u32,
    pub bdba: u32,
    pub slot: u16,
    pub slt: u8,
    pub rci: u8,
    pub op_flags: u16,
    pub flg: u16,
    pub fb: u8,
    pub obj: u32,
    pub data_obj: u32,
    pub supp_log_type: u8,
    pub supp_log_fb: u8,
    pub supp_log_cc: u16,
    pub supp_log_before: u16,
    pub supp_log_after: u16,
    pub supp_log_bdba: u32,
    pub supp_log_slot: u16,
    pub field_cnt: u16,
    pub field_pos: u16,
    pub field_lengths_delta: u16,
    pub data: Vec<u8>,
}

impl RedoRecord {
    /// Total payload length in bytes.
    pub fn length(&self) -> usize {
        self.data.len()
    }

    /// Whether any multi-block UNDO fragment flag is set.
    pub fn is_multi_block_undo(&self) -> bool {
        self.flg & (FLG_MULTIBLOCKUNDOHEAD | FLG_MULTIBLOCKUNDOMID | FLG_MULTIBLOCKUNDOTAIL) != 0
    }

    /// Length of field `index` (1-based) from the field-length table.
    pub fn field_length(&self, index: u16) -> u16 {
        debug_assert!(index >= 1 && index <= self.field_cnt);
        read_u16(
            &self.data,
            self.field_lengths_delta as usize + 2 * index as usize,
        )
    }

    /// Byte range of field `index` (1-based) inside the payload. Fields are
    /// stored in order, each padded to a 4-byte boundary.
    pub fn field_range(&self, index: u16) -> std::ops::Range<usize> {
        debug_assert!(index >= 1 && index <= self.field_cnt);
        let mut pos = self.field_pos as usize;
        for i in 1..index {
            pos += crate::config::align4(self.field_length(i) as usize);
        }
        pos..pos + self.field_length(index) as usize
    }

    pub(crate) fn meta(&self) -> RecordMeta {
        RecordMeta {
            scn: U64::new(self.scn),
            uba: U64::new(self.uba),
            xid: U64::new(self.xid.0),
            op_code: U32::new(self.op_code),
            dba: U32::new(self.dba),
            bdba: U32::new(self.bdba),
            obj: U32::new(self.obj),
            data_obj: U32::new(self.data_obj),
            supp_log_bdba: U32::new(self.supp_log_bdba),
            length: U32::new(self.data.len() as u32),
            sub_scn: U16::new(self.sub_scn),
            slot: U16::new(self.slot),
            op_flags: U16::new(self.op_flags),
            flg: U16::new(self.flg),
            supp_log_cc: U16::new(self.supp_log_cc),
            supp_log_before: U16::new(self.supp_log_before),
            supp_log_after: U16::new(self.supp_log_after),
            supp_log_slot: U16::new(self.supp_log_slot),
            field_cnt: U16::new(self.field_cnt),
            field_pos: U16::new(self.field_pos),
            field_lengths_delta: U16::new(self.field_lengths_delta),
            slt: self.slt,
            rci: self.rci,
            fb: self.fb,
            supp_log_type: self.supp_log_type,
            supp_log_fb: self.supp_log_fb,
            _reserved: [0; 1],
        }
    }

    pub(crate) fn from_meta(meta: &RecordMeta, data: Vec<u8>) -> Self {
        debug_assert_eq!(meta.length.get() as usize, data.len());
        Self {
            op_code: meta.op_code.get(),
            scn: meta.scn.get(),
            sub_scn: meta.sub_scn.get(),
            xid: Xid(meta.xid.get()),
            uba: meta.uba.get(),
            dba: meta.dba.get(),
            bdba: meta.bdba.get(),
            slot: meta.slot.get(),
            slt: meta.slt,
            rci: meta.rci,
            op_flags: meta.op_flags.get(),
            flg: meta.flg.get(),
            fb: meta.fb,
            obj: meta.obj.get(),
            data_obj: meta.data_obj.get(),
            supp_log_type: meta.supp_log_type,
            supp_log_fb: meta.supp_log_fb,
            supp_log_cc: meta.supp_log_cc.get(),
            supp_log_before: meta.supp_log_before.get(),
            supp_log_after: meta.supp_log_after.get(),
            supp_log_bdba: meta.supp_log_bdba.get(),
            supp_log_slot: meta.supp_log_slot.get(),
            field_cnt: meta.field_cnt.get(),
            field_pos: meta.field_pos.get(),
            field_lengths_delta: meta.field_lengths_delta.get(),
            data,
        }
    }
}

/// Size of the serialized record metadata frame.
pub const RECORD_META_SIZE: usize = 80;

/// Fixed little-endian mirror of the record header fields, persisted in chunk
/// and split-block frames. Field order groups widths so the layout packs
/// without interior padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout)]
pub(crate) struct RecordMeta {
    pub scn: U64,
    pub uba: U64,
    pub xid: U64,
    pub op_code: U32,
    pub dba: U32,
    pub bdba: U32,
    pub obj: U32,
    pub data_obj: U32,
    pub supp_log_bdba: U32,
    pub length: U32,
    pub sub_scn: U16,
    pub slot: U16,
    pub op_flags: U16,
    pub flg: U16,
    pub supp_log_cc: U16,
    pub supp_log_before: U16,
    pub supp_log_after: U16,
    pub supp_log_slot: U16,
    pub field_cnt: U16,
    pub field_pos: U16,
    pub field_lengths_delta: U16,
    pub slt: u8,
    pub rci: u8,
    pub fb: u8,
    pub supp_log_type: u8,
    pub supp_log_fb: u8,
    _reserved: [u8; 1],
}

const _: () = assert!(
    std::mem::size_of::<RecordMeta>() == RECORD_META_SIZE,
    "RecordMeta layout drifted from RECORD_META_SIZE"
);

/// Read a little-endian u16 at `pos` (field-length table entries).
#[inline]
pub fn read_u16(data: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([data[pos], data[pos + 1]])
}

/// Write a little-endian u16 at `pos`.
#[inline]
pub fn write_u16(data: &mut [u8], pos: usize, val: u16) {
    data[pos..pos + 2].copy_from_slice(&val.to_le_bytes());
}
