//! # Configuration Module
//!
//! Recognized output options plus the shared size/layout constants. Options
//! are plain enums with `Default` impls; the engine and the formatter read
//! them from a single [`FormatOptions`] value resolved at startup.
//!
//! ## Module Organization
//!
//! - [`constants`]: numeric configuration values with dependency documentation
//! - [`FormatOptions`]: framing, rendering, and projection selectors

pub mod constants;
pub use constants::*;

/// Message framing style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    /// Transaction header fields (scn, xid, time) appear once per message.
    #[default]
    Default,
    /// Every DML event repeats the transaction header fields.
    Full,
}

/// XID rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XidFormat {
    /// `"0xUSN.SLT.SQN"` text triple.
    #[default]
    Text,
    /// Raw 64-bit value.
    Numeric,
}

/// SCN-time rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    /// Seconds since the Unix epoch, as a number.
    #[default]
    UnixSeconds,
    /// ISO-8601 UTC string.
    Iso8601,
}

/// Column value rendering for decodable character data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharFormat {
    /// Decode through the configured NLS character set.
    #[default]
    Decoded,
    /// Always dump as hex.
    Hex,
}

/// SCN rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScnFormat {
    /// Plain decimal number.
    #[default]
    Decimal,
    /// `"0x%016x"` string.
    Hex,
}

/// Behavior when a column value does not decode cleanly in the configured
/// character set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFormat {
    /// Drop the column from the event.
    Drop,
    /// Emit the raw bytes as hex.
    #[default]
    Hex,
}

/// Inclusion of schema metadata per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaFormat {
    /// No object identifiers on DML events.
    Omit,
    /// Object and data-object identifiers on every event.
    #[default]
    Include,
}

/// Column projection for update events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnFormat {
    /// Every captured column, changed or not.
    Full,
    /// Drop columns whose before and after images are identical.
    Changed,
    /// Like `Changed`, and additionally drop columns that are present in only
    /// one image with no payload (supplemental padding).
    #[default]
    InsDec,
}

/// The recognized output options. Field names follow the option names the
/// surrounding engine accepts from its configuration file.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub message_format: MessageFormat,
    pub xid_format: XidFormat,
    pub timestamp_format: TimestampFormat,
    pub char_format: CharFormat,
    pub scn_format: ScnFormat,
    pub unknown_format: UnknownFormat,
    pub schema_format: SchemaFormat,
    pub column_format: ColumnFormat,
    /// Oversized-transaction split threshold in MiB; 0 disables splitting.
    pub max_message_mb: u64,
    /// Default character set, resolved by Oracle name at startup.
    pub nls_charset: String,
    /// Default NCHAR character set, resolved by Oracle name at startup.
    pub nls_nchar_charset: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            message_format: MessageFormat::default(),
            xid_format: XidFormat::default(),
            timestamp_format: TimestampFormat::default(),
            char_format: CharFormat::default(),
            scn_format: ScnFormat::default(),
            unknown_format: UnknownFormat::default(),
            schema_format: SchemaFormat::default(),
            column_format: ColumnFormat::default(),
            max_message_mb: 0,
            nls_charset: "AL32UTF8".to_string(),
            nls_nchar_charset: "AL16UTF16".to_string(),
        }
    }
}
