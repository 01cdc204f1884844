//! End-to-end assembly scenarios: records in, framed JSON messages out.

use std::sync::Arc;

use redorelay::config::FormatOptions;
use redorelay::engine::Engine;
use redorelay::memory::MemoryPool;
use redorelay::output::{JsonFormatter, OutputBuffer, OutputReader};
use redorelay::redo::record::{write_u16, FB_L, OP_FLAGS_BEGIN};
use redorelay::redo::{RedoRecord, Scn, Xid};

fn engine() -> (Engine, OutputReader) {
    engine_with(FormatOptions::default())
}

fn engine_with(opts: FormatOptions) -> (Engine, OutputReader) {
    let pool = Arc::new(MemoryPool::new(0, 64));
    let out = OutputBuffer::new(pool.clone()).unwrap();
    let engine = Engine::new(pool, out, Box::new(JsonFormatter::new(opts)));
    let reader = engine.reader();
    (engine, reader)
}

// Payload with two 4-byte header fields followed by one field per column.
fn piece_data(cols: &[&[u8]]) -> (Vec<u8>, u16, u16) {
    let cnt = 2 + cols.len() as u16;
    let table = (((cnt as usize + 1) * 2) + 3) & !3;
    let mut data = vec![0u8; table];
    write_u16(&mut data, 0, cnt);
    write_u16(&mut data, 2, 4);
    write_u16(&mut data, 4, 4);
    for (i, c) in cols.iter().enumerate() {
        write_u16(&mut data, 6 + 2 * i, c.len() as u16);
    }
    data.extend_from_slice(&[0u8; 8]);
    for c in cols {
        let mut padded = c.to_vec();
        padded.resize((c.len() + 3) & !3, 0);
        data.extend_from_slice(&padded);
    }
    (data, cnt, table as u16)
}

struct PieceSpec<'a> {
    scn: Scn,
    slt: u8,
    rci: u8,
    uba: u64,
    bdba: u32,
    slot: u16,
    first_col: u16,
    last_piece: bool,
    before: &'a [&'a [u8]],
    after: &'a [&'a [u8]],
}

impl Default for PieceSpec<'_> {
    fn default() -> Self {
        Self {
            scn: 100,
            slt: 1,
            rci: 1,
            uba: 0x10,
            bdba: 0x0040_0100,
            slot: 1,
            first_col: 1,
            last_piece: false,
            before: &[],
            after: &[],
        }
    }
}

// One undo/redo pair for a row-piece operation.
fn pair(sub_op: u32, spec: PieceSpec<'_>) -> (RedoRecord, RedoRecord) {
    let (data1, cnt1, pos1) = piece_data(spec.before);
    let rec1 = RedoRecord {
        op_code: 0x0501,
        scn: spec.scn,
        slt: spec.slt,
        rci: spec.rci,
        uba: spec.uba,
        obj: 5001,
        data_obj: 5001,
        supp_log_type: 1,
        supp_log_fb: if spec.last_piece { FB_L } else { 0 },
        supp_log_cc: spec.before.len() as u16,
        supp_log_before: spec.first_col,
        supp_log_bdba: spec.bdba,
        supp_log_slot: spec.slot,
        field_cnt: cnt1,
        field_pos: pos1,
        field_lengths_delta: 0,
        data: data1,
        ..Default::default()
    };

    let (data2, cnt2, pos2) = piece_data(spec.after);
    let rec2 = RedoRecord {
        op_code: sub_op,
        scn: spec.scn,
        obj: 5001,
        data_obj: 5001,
        supp_log_cc: spec.after.len() as u16,
        supp_log_after: spec.first_col,
        field_cnt: cnt2,
        field_pos: pos2,
        field_lengths_delta: 0,
        data: data2,
        ..Default::default()
    };
    (rec1, rec2)
}

fn drain(reader: &mut OutputReader) -> Vec<String> {
    let mut msgs = Vec::new();
    while let Some(m) = reader.try_next() {
        msgs.push(String::from_utf8(m).unwrap());
    }
    msgs
}

#[test]
fn single_row_insert_from_two_pieces() {
    let (mut engine, mut reader) = engine();
    let xid = Xid::new(1, 1, 100);
    engine.begin(xid, 90, 1);

    let (r1a, r2a) = pair(
        0x0B02,
        PieceSpec {
            scn: 100,
            uba: 0x10,
            first_col: 2,
            after: &[b"li"],
            ..Default::default()
        },
    );
    let (r1b, r2b) = pair(
        0x0B02,
        PieceSpec {
            scn: 101,
            rci: 2,
            uba: 0x11,
            first_col: 1,
            last_piece: true,
            after: &[b"a"],
            ..Default::default()
        },
    );
    engine.op(xid, 1, r1a, Some(r2a)).unwrap();
    engine.op(xid, 1, r1b, Some(r2b)).unwrap();
    engine.commit(xid, 120, 1_700_000_000);

    assert_eq!(engine.flush_committed().unwrap(), 1);
    let msgs = drain(&mut reader);
    assert_eq!(msgs.len(), 1);
    let msg = &msgs[0];

    assert_eq!(msg.matches("\"op\":\"c\"").count(), 1);
    assert!(msg.contains("\"scn\":120"));
    assert!(msg.contains("\"1\":\"a\""));
    assert!(msg.contains("\"2\":\"li\""));
    assert_eq!(engine.open_transactions(), 0);
}

#[test]
fn insert_then_delete_classifies_as_update() {
    let (mut engine, mut reader) = engine();
    let xid = Xid::new(1, 2, 7);
    engine.begin(xid, 10, 1);

    let (r1a, r2a) = pair(
        0x0B02,
        PieceSpec {
            scn: 11,
            after: &[b"new"],
            ..Default::default()
        },
    );
    let (r1b, r2b) = pair(
        0x0B03,
        PieceSpec {
            scn: 12,
            rci: 2,
            uba: 0x11,
            last_piece: true,
            before: &[b"old"],
            ..Default::default()
        },
    );
    engine.op(xid, 1, r1a, Some(r2a)).unwrap();
    engine.op(xid, 1, r1b, Some(r2b)).unwrap();
    engine.commit(xid, 20, 0);

    engine.flush_committed().unwrap();
    let msgs = drain(&mut reader);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].matches("\"op\":\"u\"").count(), 1);
}

#[test]
fn last_piece_bit_on_first_piece_emits_single_piece_dml() {
    let (mut engine, mut reader) = engine();
    let xid = Xid::new(1, 3, 8);
    engine.begin(xid, 10, 1);

    let (r1, r2) = pair(
        0x0B02,
        PieceSpec {
            scn: 11,
            last_piece: true,
            after: &[b"solo"],
            ..Default::default()
        },
    );
    engine.op(xid, 1, r1, Some(r2)).unwrap();
    engine.commit(xid, 20, 0);

    engine.flush_committed().unwrap();
    let msgs = drain(&mut reader);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].matches("\"op\":\"c\"").count(), 1);
    assert!(msgs[0].contains("\"solo\""));
}

#[test]
fn overwrite_after_insert_slots_in_before_the_tail() {
    let (mut engine, mut reader) = engine();
    let xid = Xid::new(1, 4, 9);
    engine.begin(xid, 10, 1);

    let (r1a, r2a) = pair(
        0x0B02,
        PieceSpec {
            scn: 11,
            first_col: 1,
            before: &[b"t-old"],
            after: &[b"tail-val"],
            ..Default::default()
        },
    );
    let (r1b, r2b) = pair(
        0x0B06,
        PieceSpec {
            scn: 12,
            rci: 2,
            uba: 0x11,
            first_col: 2,
            last_piece: true,
            before: &[b"m-old"],
            after: &[b"mid-val"],
            ..Default::default()
        },
    );
    engine.op(xid, 1, r1a, Some(r2a)).unwrap();
    engine.op(xid, 1, r1b, Some(r2b)).unwrap();
    engine.commit(xid, 20, 0);

    engine.flush_committed().unwrap();
    let msgs = drain(&mut reader);
    assert_eq!(msgs.len(), 1);
    let msg = &msgs[0];

    // the overwrite piece precedes the insert piece in the emitted chain
    assert_eq!(msg.matches("\"op\":\"u\"").count(), 1);
    let mid = msg.find("mid-val").unwrap();
    let tail = msg.find("tail-val").unwrap();
    assert!(mid < tail, "overwrite piece must come before the insert tail");
}

#[test]
fn rollback_by_match_removes_stored_operation() {
    let (mut engine, _reader) = engine();
    let xid = Xid::new(2, 1, 50);
    engine.begin(xid, 90, 1);

    let (mut r1, mut r2) = pair(
        0x0B02,
        PieceSpec {
            scn: 100,
            slt: 7,
            rci: 3,
            uba: 0xDEAD,
            after: &[b"gone"],
            ..Default::default()
        },
    );
    r1.scn = 100;
    r2.dba = 0x2000;
    r2.slot = 5;
    engine.op(xid, 1, r1, Some(r2)).unwrap();
    assert_eq!(engine.transaction(xid).unwrap().op_codes(), 1);

    let rb1 = RedoRecord {
        op_code: 0x0501,
        uba: 0xDEAD,
        dba: 0x2000,
        slot: 5,
        ..Default::default()
    };
    let rb2 = RedoRecord {
        op_code: 0x0B03,
        slt: 7,
        rci: 3,
        scn: 150,
        ..Default::default()
    };
    engine.rollback_op(xid, rb1, rb2).unwrap();

    let tx = engine.transaction(xid).unwrap();
    assert_eq!(tx.op_codes(), 0);
    assert_eq!(tx.last_scn, 150);
}

#[test]
fn rollback_arriving_first_cancels_the_later_record() {
    let (mut engine, mut reader) = engine();
    let xid = Xid::new(2, 2, 51);
    engine.begin(xid, 90, 1);

    let rb1 = RedoRecord {
        op_code: 0x0501,
        uba: 0xBEEF,
        ..Default::default()
    };
    let rb2 = RedoRecord {
        op_code: 0x0B03,
        slt: 4,
        rci: 1,
        scn: 200,
        op_flags: OP_FLAGS_BEGIN,
        ..Default::default()
    };
    engine.rollback_op(xid, rb1, rb2).unwrap();

    let (r1, r2) = pair(
        0x0B02,
        PieceSpec {
            scn: 150,
            slt: 4,
            rci: 1,
            uba: 0xBEEF,
            last_piece: true,
            after: &[b"never"],
            ..Default::default()
        },
    );
    engine.op(xid, 1, r1, Some(r2)).unwrap();
    assert_eq!(engine.transaction(xid).unwrap().op_codes(), 0);

    engine.commit(xid, 210, 0);
    engine.flush_committed().unwrap();
    assert!(drain(&mut reader).is_empty());
}

#[test]
fn oversize_transaction_divides_at_row_boundaries() {
    let (mut engine, mut reader) = engine_with(FormatOptions {
        max_message_mb: 1,
        ..FormatOptions::default()
    });
    let xid = Xid::new(3, 1, 60);
    engine.begin(xid, 1000, 1);

    const ROWS: usize = 4096;
    for i in 0..ROWS {
        let value = format!("row-{i:04}");
        let (r1, r2) = pair(
            0x0B02,
            PieceSpec {
                scn: 1000 + i as Scn,
                rci: (i % 200) as u8,
                uba: 0x1000 + i as u64,
                last_piece: true,
                after: &[value.as_bytes()],
                ..Default::default()
            },
        );
        engine.op(xid, 1, r1, Some(r2)).unwrap();
    }
    engine.commit(xid, 9000, 0);
    engine.flush_committed().unwrap();

    let msgs = drain(&mut reader);
    assert!(msgs.len() >= 2, "expected a forced division, got {} messages", msgs.len());

    let all: String = msgs.concat();
    assert_eq!(all.matches("\"op\":\"c\"").count(), ROWS);

    // delivery order matches insertion order
    let mut prev = 0;
    for i in 0..ROWS {
        let at = all
            .find(&format!("row-{i:04}"))
            .expect("every row delivered");
        assert!(at >= prev);
        prev = at;
    }
}

#[test]
fn whole_transaction_rollback_emits_nothing() {
    let (mut engine, mut reader) = engine();
    let xid = Xid::new(3, 2, 61);
    engine.begin(xid, 10, 1);

    let (r1, r2) = pair(
        0x0B02,
        PieceSpec {
            scn: 11,
            last_piece: true,
            after: &[b"discarded"],
            ..Default::default()
        },
    );
    engine.op(xid, 1, r1, Some(r2)).unwrap();
    engine.rollback(xid, 20);

    assert_eq!(engine.flush_committed().unwrap(), 1);
    assert!(drain(&mut reader).is_empty());
    assert_eq!(engine.open_transactions(), 0);
}

#[test]
fn multi_row_and_truncate_operations_flush() {
    let (mut engine, mut reader) = engine();
    let xid = Xid::new(3, 4, 63);
    engine.begin(xid, 10, 1);

    // self-contained multi-row insert: one field per row image
    let (r1, r2) = pair(
        0x0B0B,
        PieceSpec {
            scn: 11,
            after: &[b"row-a", b"row-b"],
            ..Default::default()
        },
    );
    engine.op(xid, 1, r1, Some(r2)).unwrap();

    // truncate marker
    let (mut t1, mut t2) = pair(
        0x0B02,
        PieceSpec {
            scn: 12,
            rci: 2,
            uba: 0x11,
            ..Default::default()
        },
    );
    t1.op_code = 0x1801;
    t2.op_code = 0;
    t2.data.clear();
    t2.field_cnt = 0;
    engine.op(xid, 1, t1, Some(t2)).unwrap();
    engine.commit(xid, 20, 0);

    engine.flush_committed().unwrap();
    let msgs = drain(&mut reader);
    assert_eq!(msgs.len(), 1);
    let msg = &msgs[0];
    assert!(msg.contains("\"rows\":["));
    assert!(msg.contains("\"op\":\"ddl\""));
    assert!(msg.contains("\"type\":\"truncate\""));
}

#[test]
fn missing_supplemental_logging_is_fatal() {
    let (mut engine, _reader) = engine();
    let xid = Xid::new(3, 3, 62);
    engine.begin(xid, 10, 1);

    let (mut r1, r2) = pair(
        0x0B02,
        PieceSpec {
            scn: 11,
            last_piece: true,
            after: &[b"x"],
            ..Default::default()
        },
    );
    r1.supp_log_type = 0;
    engine.op(xid, 1, r1, Some(r2)).unwrap();
    engine.commit(xid, 20, 0);

    let err = engine.flush_committed().unwrap_err();
    assert!(err.to_string().contains("SUPPLEMENTAL_LOG_DATA_MIN"));
}
