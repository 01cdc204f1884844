//! # Event Formatters
//!
//! The wire encoding of BEGIN / DML / COMMIT framing is pluggable: the flush
//! walk drives a [`Formatter`], which writes whatever encoding the sink
//! expects through the output buffer's producer half.
//!
//! [`JsonFormatter`] is the stock implementation. One message carries one
//! transaction envelope (or one slice of a divided big transaction):
//!
//! ```text
//! {"scn":..,"tm":..,"xid":"..","dml":[{..},{..}]}
//! ```
//!
//! Column images come from the supplemental-log fields of the row pieces:
//! the undo side carries the before image, the redo side the after image,
//! with column numbering starting at `supp_log_before` / `supp_log_after`.

use eyre::Result;
use smallvec::SmallVec;

use super::buffer::OutputBuffer;
use crate::config::{
    CharFormat, ColumnFormat, FormatOptions, MessageFormat, SchemaFormat, ScnFormat,
    TimestampFormat, UnknownFormat, XidFormat,
};
use crate::redo::{RedoRecord, Scn, Time, Xid};

/// Logical DML classification of an assembled row chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmlKind {
    Insert,
    Update,
    Delete,
}

impl DmlKind {
    fn code(self) -> &'static str {
        match self {
            DmlKind::Insert => "c",
            DmlKind::Update => "u",
            DmlKind::Delete => "d",
        }
    }
}

/// Encoding hooks driven by the commit flush.
pub trait Formatter {
    /// Oversized-transaction split threshold in MiB; 0 disables splitting.
    fn max_message_mb(&self) -> u64;

    /// Open a message for one transaction (or one slice of it).
    fn begin(&mut self, out: &mut OutputBuffer, scn: Scn, time: Time, xid: Xid) -> Result<()>;

    /// Close and publish the current message.
    fn commit(&mut self, out: &mut OutputBuffer) -> Result<()>;

    /// One logical row change, assembled from a piece chain.
    fn dml(
        &mut self,
        out: &mut OutputBuffer,
        pieces: &[(&RedoRecord, &RedoRecord)],
        kind: DmlKind,
    ) -> Result<()>;

    /// Self-contained multi-row insert.
    fn insert_multiple(
        &mut self,
        out: &mut OutputBuffer,
        rec1: &RedoRecord,
        rec2: &RedoRecord,
    ) -> Result<()>;

    /// Self-contained multi-row delete.
    fn delete_multiple(
        &mut self,
        out: &mut OutputBuffer,
        rec1: &RedoRecord,
        rec2: &RedoRecord,
    ) -> Result<()>;

    /// DDL marker (truncate).
    fn ddl(&mut self, out: &mut OutputBuffer, rec1: &RedoRecord) -> Result<()>;
}

/// Supplemental-log columns start at field 3; fields 1 and 2 carry the
/// opcode headers.
const FIRST_COLUMN_FIELD: u16 = 3;

/// JSON event encoder.
pub struct JsonFormatter {
    opts: FormatOptions,
    first_event: bool,
    scn: Scn,
    xid: Xid,
}

impl JsonFormatter {
    pub fn new(opts: FormatOptions) -> Self {
        Self {
            opts,
            first_event: true,
            scn: 0,
            xid: Xid(0),
        }
    }

    fn push_scn(&self, body: &mut String, scn: Scn) {
        match self.opts.scn_format {
            ScnFormat::Decimal => body.push_str(&scn.to_string()),
            ScnFormat::Hex => {
                body.push('"');
                body.push_str(&format!("0x{:016x}", scn));
                body.push('"');
            }
        }
    }

    fn push_xid(&self, body: &mut String, xid: Xid) {
        match self.opts.xid_format {
            XidFormat::Text => {
                body.push('"');
                body.push_str(&xid.to_string());
                body.push('"');
            }
            XidFormat::Numeric => body.push_str(&xid.0.to_string()),
        }
    }

    fn push_time(&self, body: &mut String, time: Time) {
        match self.opts.timestamp_format {
            TimestampFormat::UnixSeconds => body.push_str(&time.to_string()),
            TimestampFormat::Iso8601 => {
                let rendered = chrono::DateTime::from_timestamp(time as i64, 0)
                    .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                    .unwrap_or_default();
                body.push('"');
                body.push_str(&rendered);
                body.push('"');
            }
        }
    }

    fn event_prefix(&mut self, body: &mut String, op: &str, obj: u32, data_obj: u32) {
        if !self.first_event {
            body.push(',');
        }
        self.first_event = false;
        body.push_str("{\"op\":\"");
        body.push_str(op);
        body.push('"');
        if self.opts.schema_format == SchemaFormat::Include {
            body.push_str(&format!(",\"obj\":{},\"dataobj\":{}", obj, data_obj));
        }
        if self.opts.message_format == MessageFormat::Full {
            body.push_str(",\"scn\":");
            self.push_scn(body, self.scn);
            body.push_str(",\"xid\":");
            let xid = self.xid;
            self.push_xid(body, xid);
        }
    }

    /// Render one column value. Returns `None` when the configured policy
    /// drops the value instead.
    fn render_value(&self, out: &OutputBuffer, bytes: &[u8]) -> Option<String> {
        match self.opts.char_format {
            CharFormat::Hex => Some(quoted_hex(bytes)),
            CharFormat::Decoded => {
                let (text, clean) = out.charsets().decode(out.charsets().default_id(), bytes);
                if clean {
                    let mut s = String::with_capacity(text.len() + 2);
                    s.push('"');
                    escape_json_into(&text, &mut s);
                    s.push('"');
                    Some(s)
                } else {
                    match self.opts.unknown_format {
                        UnknownFormat::Hex => Some(quoted_hex(bytes)),
                        UnknownFormat::Drop => None,
                    }
                }
            }
        }
    }

    fn push_image(
        &self,
        out: &OutputBuffer,
        body: &mut String,
        label: &str,
        cols: &[(u16, &[u8])],
    ) {
        body.push_str(",\"");
        body.push_str(label);
        body.push_str("\":{");
        let mut first = true;
        for &(col, bytes) in cols {
            let Some(value) = self.render_value(out, bytes) else {
                continue;
            };
            if !first {
                body.push(',');
            }
            first = false;
            body.push_str(&format!("\"{}\":{}", col, value));
        }
        body.push('}');
    }
}

impl Formatter for JsonFormatter {
    fn max_message_mb(&self) -> u64 {
        self.opts.max_message_mb
    }

    fn begin(&mut self, out: &mut OutputBuffer, scn: Scn, time: Time, xid: Xid) -> Result<()> {
        out.begin_message()?;
        self.first_event = true;
        self.scn = scn;
        self.xid = xid;

        let mut body = String::new();
        body.push_str("{\"scn\":");
        self.push_scn(&mut body, scn);
        body.push_str(",\"tm\":");
        self.push_time(&mut body, time);
        body.push_str(",\"xid\":");
        self.push_xid(&mut body, xid);
        body.push_str(",\"dml\":[");
        out.append_str(&body)
    }

    fn commit(&mut self, out: &mut OutputBuffer) -> Result<()> {
        out.append_str("]}")?;
        out.commit_message()
    }

    fn dml(
        &mut self,
        out: &mut OutputBuffer,
        pieces: &[(&RedoRecord, &RedoRecord)],
        kind: DmlKind,
    ) -> Result<()> {
        let (head1, head2) = pieces.first().expect("emitted chains are never empty");

        let mut before: SmallVec<[(u16, &[u8]); 16]> = SmallVec::new();
        let mut after: SmallVec<[(u16, &[u8]); 16]> = SmallVec::new();
        for &(rec1, rec2) in pieces {
            collect_columns(rec1, rec1.supp_log_before, &mut before);
            collect_columns(rec2, rec2.supp_log_after, &mut after);
        }

        if kind == DmlKind::Update && self.opts.column_format != ColumnFormat::Full {
            project_changed(&mut before, &mut after, self.opts.column_format);
        }

        let mut body = String::new();
        self.event_prefix(&mut body, kind.code(), head1.obj, head2.data_obj);
        match kind {
            DmlKind::Insert => self.push_image(out, &mut body, "after", &after),
            DmlKind::Delete => self.push_image(out, &mut body, "before", &before),
            DmlKind::Update => {
                self.push_image(out, &mut body, "before", &before);
                self.push_image(out, &mut body, "after", &after);
            }
        }
        body.push('}');
        out.append_str(&body)
    }

    fn insert_multiple(
        &mut self,
        out: &mut OutputBuffer,
        rec1: &RedoRecord,
        rec2: &RedoRecord,
    ) -> Result<()> {
        let mut body = String::new();
        self.event_prefix(&mut body, "c", rec1.obj, rec2.data_obj);
        push_rows(&mut body, rec2);
        body.push('}');
        out.append_str(&body)
    }

    fn delete_multiple(
        &mut self,
        out: &mut OutputBuffer,
        rec1: &RedoRecord,
        rec2: &RedoRecord,
    ) -> Result<()> {
        let mut body = String::new();
        self.event_prefix(&mut body, "d", rec1.obj, rec2.data_obj);
        push_rows(&mut body, rec2);
        body.push('}');
        out.append_str(&body)
    }

    fn ddl(&mut self, out: &mut OutputBuffer, rec1: &RedoRecord) -> Result<()> {
        let mut body = String::new();
        self.event_prefix(&mut body, "ddl", rec1.obj, rec1.data_obj);
        body.push_str(",\"type\":\"truncate\"}");
        out.append_str(&body)
    }
}

/// Append the supplemental-log columns of one record: `supp_log_cc` fields
/// starting at field 3, numbered from `first_col`.
fn collect_columns<'a>(
    rec: &'a RedoRecord,
    first_col: u16,
    cols: &mut SmallVec<[(u16, &'a [u8]); 16]>,
) {
    let mut field = FIRST_COLUMN_FIELD;
    let mut col = first_col.max(1);
    let mut remaining = rec.supp_log_cc;
    while remaining > 0 && field <= rec.field_cnt {
        cols.push((col, &rec.data[rec.field_range(field)]));
        field += 1;
        col += 1;
        remaining -= 1;
    }
}

/// Column projection for updates: drop columns whose before and after bytes
/// are identical; under INS-DEC also drop one-sided empty columns.
fn project_changed(
    before: &mut SmallVec<[(u16, &[u8]); 16]>,
    after: &mut SmallVec<[(u16, &[u8]); 16]>,
    format: ColumnFormat,
) {
    let unchanged: Vec<u16> = before
        .iter()
        .filter_map(|(col, b)| {
            after
                .iter()
                .find(|(c, _)| c == col)
                .and_then(|(_, a)| (a == b).then_some(*col))
        })
        .collect();
    before.retain(|(col, _)| !unchanged.contains(col));
    after.retain(|(col, _)| !unchanged.contains(col));

    if format == ColumnFormat::InsDec {
        let after_snapshot: Vec<u16> = after.iter().map(|(c, _)| *c).collect();
        before.retain(|(col, b)| !(b.is_empty() && !after_snapshot.contains(col)));
        let before_snapshot: Vec<u16> = before.iter().map(|(c, _)| *c).collect();
        after.retain(|(col, a)| !(a.is_empty() && !before_snapshot.contains(col)));
    }
}

/// Rows of a self-contained multi-row operation: one field per row image,
/// starting at field 3.
fn push_rows(body: &mut String, rec: &RedoRecord) {
    body.push_str(",\"rows\":[");
    let mut first = true;
    for field in FIRST_COLUMN_FIELD..=rec.field_cnt {
        if !first {
            body.push(',');
        }
        first = false;
        body.push_str(&quoted_hex(&rec.data[rec.field_range(field)]));
    }
    body.push(']');
}

fn quoted_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2 + 2);
    s.push('"');
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s.push('"');
    s
}

fn escape_json_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
}
