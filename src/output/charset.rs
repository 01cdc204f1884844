//! # Character Set Dictionary
//!
//! Oracle charset id → decoder registry, built once at output-buffer
//! construction and immutable afterwards. Column bytes captured from redo
//! carry no encoding marker of their own; the configured NLS defaults decide
//! how character columns decode.
//!
//! Decoders map byte streams to Unicode; bytes with no mapping decode to
//! U+FFFD and flag the value as lossy so the formatter can apply the
//! configured unknown-value policy.

use eyre::{bail, Result};
use hashbrown::HashMap;
use tracing::info;

/// A single-byte or multi-byte decoder for one Oracle character set.
pub trait CharacterDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode `data` into `out`. Returns whether every byte mapped cleanly.
    fn decode(&self, data: &[u8], out: &mut String) -> bool;
}

/// 7-bit ASCII (US7ASCII).
struct Ascii7;

impl CharacterDecoder for Ascii7 {
    fn name(&self) -> &'static str {
        "US7ASCII"
    }

    fn decode(&self, data: &[u8], out: &mut String) -> bool {
        let mut clean = true;
        for &b in data {
            if b < 0x80 {
                out.push(b as char);
            } else {
                out.push(char::REPLACEMENT_CHARACTER);
                clean = false;
            }
        }
        clean
    }
}

/// ISO 8859-1 (WE8ISO8859P1): bytes map to the first 256 code points.
struct Latin1;

impl CharacterDecoder for Latin1 {
    fn name(&self) -> &'static str {
        "WE8ISO8859P1"
    }

    fn decode(&self, data: &[u8], out: &mut String) -> bool {
        for &b in data {
            out.push(b as char);
        }
        true
    }
}

/// Windows-1252 (WE8MSWIN1252): Latin-1 with the C1 range remapped.
struct Win1252;

/// Code points for bytes 0x80..0xA0; 0 marks an unassigned byte.
const WIN1252_C1: [u16; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, 0x02C6, 0x2030, 0x0160, 0x2039,
    0x0152, 0, 0x017D, 0, 0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, 0x02DC,
    0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

impl CharacterDecoder for Win1252 {
    fn name(&self) -> &'static str {
        "WE8MSWIN1252"
    }

    fn decode(&self, data: &[u8], out: &mut String) -> bool {
        let mut clean = true;
        for &b in data {
            if (0x80..0xA0).contains(&b) {
                match WIN1252_C1[(b - 0x80) as usize] {
                    0 => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        clean = false;
                    }
                    cp => out.push(char::from_u32(cp as u32).expect("BMP code point")),
                }
            } else {
                out.push(b as char);
            }
        }
        clean
    }
}

/// UTF-8 under either of its Oracle names (UTF8 / AL32UTF8).
struct Utf8Decoder {
    name: &'static str,
}

impl CharacterDecoder for Utf8Decoder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode(&self, data: &[u8], out: &mut String) -> bool {
        let mut clean = true;
        let mut rest = data;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    return clean;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // INVARIANT: bytes up to valid_up_to() are valid UTF-8
                    out.push_str(std::str::from_utf8(&rest[..valid]).expect("validated prefix"));
                    out.push(char::REPLACEMENT_CHARACTER);
                    clean = false;
                    let skip = valid + e.error_len().unwrap_or(rest.len() - valid);
                    rest = &rest[skip..];
                }
            }
        }
    }
}

/// UTF-16BE (AL16UTF16), the NCHAR default.
struct Utf16Decoder;

impl CharacterDecoder for Utf16Decoder {
    fn name(&self) -> &'static str {
        "AL16UTF16"
    }

    fn decode(&self, data: &[u8], out: &mut String) -> bool {
        let mut clean = true;
        if data.len() % 2 != 0 {
            clean = false;
        }
        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        for decoded in char::decode_utf16(units) {
            match decoded {
                Ok(c) => out.push(c),
                Err(_) => {
                    out.push(char::REPLACEMENT_CHARACTER);
                    clean = false;
                }
            }
        }
        clean
    }
}

/// The immutable charset id → decoder table plus the resolved defaults.
pub struct CharsetRegistry {
    map: HashMap<u16, Box<dyn CharacterDecoder>>,
    default_id: u16,
    default_nchar_id: u16,
}

impl CharsetRegistry {
    /// Oracle charset id of AL32UTF8.
    pub const AL32UTF8: u16 = 873;
    /// Oracle charset id of AL16UTF16.
    pub const AL16UTF16: u16 = 2000;

    pub fn new() -> Self {
        let mut map: HashMap<u16, Box<dyn CharacterDecoder>> = HashMap::new();
        map.insert(1, Box::new(Ascii7));
        map.insert(31, Box::new(Latin1));
        map.insert(178, Box::new(Win1252));
        map.insert(871, Box::new(Utf8Decoder { name: "UTF8" }));
        map.insert(Self::AL32UTF8, Box::new(Utf8Decoder { name: "AL32UTF8" }));
        map.insert(Self::AL16UTF16, Box::new(Utf16Decoder));
        Self {
            map,
            default_id: Self::AL32UTF8,
            default_nchar_id: Self::AL16UTF16,
        }
    }

    /// Charset id registered under an Oracle name.
    pub fn resolve(&self, name: &str) -> Option<u16> {
        self.map
            .iter()
            .find(|(_, cs)| cs.name() == name)
            .map(|(&id, _)| id)
    }

    /// Resolve and install the configured defaults. Unsupported names are
    /// fatal for the session.
    pub fn set_defaults(&mut self, nls_charset: &str, nls_nchar_charset: &str) -> Result<()> {
        info!(charset = nls_charset, "loading character mapping");
        let Some(id) = self.resolve(nls_charset) else {
            bail!("unsupported NLS_CHARACTERSET value: {}", nls_charset);
        };
        info!(charset = nls_nchar_charset, "loading character mapping");
        let Some(nchar_id) = self.resolve(nls_nchar_charset) else {
            bail!("unsupported NLS_NCHAR_CHARACTERSET value: {}", nls_nchar_charset);
        };
        self.default_id = id;
        self.default_nchar_id = nchar_id;
        Ok(())
    }

    pub fn default_id(&self) -> u16 {
        self.default_id
    }

    pub fn default_nchar_id(&self) -> u16 {
        self.default_nchar_id
    }

    /// Decode `data` with charset `id` (fall back to the default decoder).
    /// Returns the decoded text and whether every byte mapped cleanly.
    pub fn decode(&self, id: u16, data: &[u8]) -> (String, bool) {
        let decoder = self
            .map
            .get(&id)
            .or_else(|| self.map.get(&self.default_id))
            .expect("default decoder always registered");
        let mut out = String::with_capacity(data.len());
        let clean = decoder.decode(data, &mut out);
        (out, clean)
    }
}

impl Default for CharsetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
