//! Character encoding support for partitioned data.
//!
//! Jobs declare the encoding of their data file by name. [`Charset::for_name`]
//! resolves that name:
//!
//! - `utf8` / `UTF-8`: strict UTF-8
//! - `latin1` / `ISO-8859-1`: one byte per code point
//! - `danmarc2`: the legacy 8-bit danMARC2 table, where diacritics are
//!   non-spacing marks written *before* the base letter
//! - anything else is looked up as a WHATWG label through `encoding_rs`
//!
//! Names are compared the way job specifications are written in practice:
//! case-insensitively, ignoring `-`, `_` and spaces.

use crate::error::{PartitionResult, PartitionerError};
use encoding_rs::Encoding;
use unicode_normalization::UnicodeNormalization;

/// A resolved character encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8 (strict)
    Utf8,
    /// ISO-8859-1, bytes map one-to-one onto U+0000..U+00FF
    Latin1,
    /// danMARC2 legacy 8-bit table
    DanMarc2,
    /// Any other encoding known to `encoding_rs`
    Other(&'static Encoding),
}

impl Charset {
    /// Resolve a declared encoding name.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::InvalidEncoding`] for blank or unknown names.
    pub fn for_name(name: &str) -> PartitionResult<Self> {
        let normalized = normalize_name(name);
        match normalized.as_str() {
            "" => Err(PartitionerError::InvalidEncoding(
                "encoding name must not be blank".to_string(),
            )),
            "utf8" => Ok(Charset::Utf8),
            "latin1" | "iso88591" | "l1" => Ok(Charset::Latin1),
            "danmarc2" => Ok(Charset::DanMarc2),
            _ => Encoding::for_label(name.trim().as_bytes())
                .map(|encoding| {
                    if encoding == encoding_rs::UTF_8 {
                        Charset::Utf8
                    } else {
                        Charset::Other(encoding)
                    }
                })
                .ok_or_else(|| {
                    PartitionerError::InvalidEncoding(format!(
                        "Specified encoding not supported: '{name}'"
                    ))
                }),
        }
    }

    /// Canonical name of this charset.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
            Charset::DanMarc2 => "danMARC2",
            Charset::Other(encoding) => encoding.name(),
        }
    }

    /// Whether `name` denotes this charset.
    #[must_use]
    pub fn is_equivalent(&self, name: &str) -> bool {
        Charset::for_name(name).is_ok_and(|other| other == *self)
    }

    /// Decode `bytes` into a string.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::UndecodableData`] if the bytes are not valid
    /// in this encoding. Latin-1 and danMARC2 accept every byte.
    pub fn decode(&self, bytes: &[u8]) -> PartitionResult<String> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| PartitionerError::UndecodableData(format!("Invalid UTF-8: {e}"))),
            Charset::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Charset::DanMarc2 => Ok(decode_danmarc2(bytes)),
            Charset::Other(encoding) => encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(std::borrow::Cow::into_owned)
                .ok_or_else(|| {
                    PartitionerError::UndecodableData(format!(
                        "Malformed {} byte sequence",
                        encoding.name()
                    ))
                }),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Lookup for the danMARC2 high half. Returns `(code point, is_combining)`.
fn danmarc2_char(byte: u8) -> Option<(u32, bool)> {
    let mapped = match byte {
        // Non-spacing diacritics, written before the base letter
        0xC1 => (0x0300, true), // grave
        0xC2 => (0x0301, true), // acute
        0xC3 => (0x0302, true), // circumflex
        0xC4 => (0x0303, true), // tilde
        0xC5 => (0x0304, true), // macron
        0xC6 => (0x0306, true), // breve
        0xC7 => (0x0307, true), // dot above
        0xC8 => (0x0308, true), // diaeresis
        0xCA => (0x030A, true), // ring above
        0xCB => (0x0327, true), // cedilla
        0xCD => (0x030B, true), // double acute
        0xCE => (0x0328, true), // ogonek
        0xCF => (0x030C, true), // caron
        // Spacing characters
        0xA1 => (0x00A1, false),
        0xA3 => (0x00A3, false),
        0xA7 => (0x00A7, false),
        0xB0 => (0x00B0, false),
        0xB1 => (0x00B1, false),
        0xBF => (0x00BF, false),
        0xE1 => (0x00C6, false), // Æ
        0xE2 => (0x0110, false), // Đ
        0xE8 => (0x0141, false), // Ł
        0xE9 => (0x00D8, false), // Ø
        0xEA => (0x0152, false), // Œ
        0xEC => (0x00DE, false), // Þ
        0xF1 => (0x00E6, false), // æ
        0xF2 => (0x0111, false), // đ
        0xF3 => (0x00F0, false), // ð
        0xF8 => (0x0142, false), // ł
        0xF9 => (0x00F8, false), // ø
        0xFA => (0x0153, false), // œ
        0xFB => (0x00DF, false), // ß
        0xFC => (0x00FE, false), // þ
        _ => return None,
    };
    Some(mapped)
}

/// Decode danMARC2 bytes to a composed (NFC) string.
///
/// Combining marks precede their base character in danMARC2, so they are held
/// back and emitted after the next base character. Unmapped bytes become
/// U+FFFD.
fn decode_danmarc2(bytes: &[u8]) -> String {
    let mut decomposed = String::with_capacity(bytes.len());
    let mut combining_chars: Vec<char> = Vec::new();

    for &byte in bytes {
        let (ch, is_combining) = if byte < 0x80 {
            (char::from(byte), false)
        } else if let Some((code_point, is_combining)) = danmarc2_char(byte) {
            (
                char::from_u32(code_point).unwrap_or('\u{FFFD}'),
                is_combining,
            )
        } else {
            ('\u{FFFD}', false)
        };

        if is_combining {
            combining_chars.push(ch);
        } else {
            decomposed.push(ch);
            decomposed.extend(combining_chars.drain(..));
        }
    }
    // Dangling marks at end of input are kept rather than dropped
    decomposed.extend(combining_chars);

    decomposed.nfc().collect()
}
