//! Reading records in danMARC2 line format.
//!
//! A record is a group of field lines terminated by a line holding only `$`
//! (or by end of input):
//!
//! ```text
//! 001 00 *a12345678*b870970
//! 004 00 *rb*ae
//! 245 00 *aA long title that
//!     continues on the next line
//! $
//! ```
//!
//! Each field line is `TAG IND *aVALUE*bVALUE`. Lines starting with
//! whitespace continue the previous line. Inside values `@*` stands for `*`,
//! `@@` for `@` and `@XXXX` (four hex digits) for that Unicode code point.
//!
//! [`LineFormatReader`] only groups lines; [`parse_record`] interprets them,
//! so one bad record can be reported with its raw bytes while the reader
//! moves on to the next.

use crate::encoding::Charset;
use crate::error::{MarcError, PartitionResult, Result};
use crate::leader::Leader;
use crate::record::{Field, Record};
use std::io::BufRead;

const END_OF_RECORD: &str = "$";

/// The lines of one record together with the bytes they were read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawLineRecord {
    /// Raw input bytes of the record, terminator line included
    pub bytes: Vec<u8>,
    /// Decoded lines without line endings, terminator excluded
    pub lines: Vec<String>,
}

/// Reader grouping lines into raw records.
#[derive(Debug)]
pub struct LineFormatReader<R: BufRead> {
    reader: R,
    charset: Charset,
}

impl<R: BufRead> LineFormatReader<R> {
    /// Create a reader decoding lines with `charset`.
    pub fn new(reader: R, charset: Charset) -> Self {
        LineFormatReader { reader, charset }
    }

    /// Read the next record's lines.
    ///
    /// Blank lines between records are skipped. Returns `Ok(None)` at end of
    /// input.
    ///
    /// # Errors
    ///
    /// Returns an error if a line cannot be decoded or the source fails.
    pub fn read_raw_record(&mut self) -> PartitionResult<Option<RawLineRecord>> {
        let mut record = RawLineRecord::default();
        let mut line = Vec::new();

        loop {
            line.clear();
            if self.reader.read_until(b'\n', &mut line)? == 0 {
                return Ok(if record.lines.is_empty() {
                    None
                } else {
                    Some(record)
                });
            }

            let mut content = line.as_slice();
            while let Some((&last, rest)) = content.split_last() {
                if last == b'\n' || last == b'\r' {
                    content = rest;
                } else {
                    break;
                }
            }
            let text = self.charset.decode(content)?;

            if text.trim().is_empty() {
                if !record.lines.is_empty() {
                    record.bytes.extend_from_slice(&line);
                }
                continue;
            }

            record.bytes.extend_from_slice(&line);
            if text.trim() == END_OF_RECORD {
                return Ok(Some(record));
            }
            record.lines.push(text);
        }
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }
}

/// Parse the lines of one record.
///
/// Records carry no leader in line format; the default leader is used.
///
/// # Errors
///
/// Returns an error for malformed field lines or escapes.
pub fn parse_record(lines: &[String]) -> Result<Record> {
    let mut record = Record::new(Leader::default());

    for logical_line in join_continuations(lines)? {
        record.add_field(parse_field_line(&logical_line)?);
    }

    Ok(record)
}

fn join_continuations(lines: &[String]) -> Result<Vec<String>> {
    let mut joined: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.starts_with(char::is_whitespace) {
            let previous = joined.last_mut().ok_or_else(|| {
                MarcError::InvalidRecord("Continuation line without field line".to_string())
            })?;
            let continuation = line.trim_start();
            if !continuation.starts_with('*') {
                previous.push(' ');
            }
            previous.push_str(continuation);
        } else {
            joined.push(line.clone());
        }
    }
    Ok(joined)
}

fn parse_field_line(line: &str) -> Result<Field> {
    let (tag, rest) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| MarcError::InvalidField(format!("No indicators or subfields: '{line}'")))?;
    if tag.len() != 3 || !tag.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(MarcError::InvalidField(format!("Invalid tag '{tag}'")));
    }

    let rest = rest.trim_start();
    let subfield_start = rest.find('*').ok_or_else(|| {
        MarcError::InvalidField(format!("Tag {tag}: no subfields"))
    })?;
    let indicators: Vec<char> = rest[..subfield_start].trim_end().chars().collect();
    let (indicator1, indicator2) = match indicators.as_slice() {
        [] => (' ', ' '),
        [i1] => (*i1, ' '),
        [i1, i2] => (*i1, *i2),
        _ => {
            return Err(MarcError::InvalidField(format!(
                "Tag {tag}: too many indicators"
            )))
        },
    };

    let mut field = Field::new(tag.to_string(), indicator1, indicator2);
    for (code, value) in split_subfields(&rest[subfield_start..])
        .map_err(|e| MarcError::InvalidField(format!("Tag {tag}: {e}")))?
    {
        field.add_subfield(code, value);
    }
    Ok(field)
}

/// Split `*aVALUE*bVALUE` into `(code, value)` pairs, resolving escapes.
fn split_subfields(data: &str) -> Result<Vec<(char, String)>> {
    let mut subfields: Vec<(char, String)> = Vec::new();
    let mut chars = data.chars();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                let code = chars.next().ok_or_else(|| {
                    MarcError::InvalidField("Subfield marker without code".to_string())
                })?;
                subfields.push((code, String::new()));
            },
            '@' => {
                let unescaped = match chars.next() {
                    Some('*') => '*',
                    Some('@') => '@',
                    Some(first) => {
                        let hex: String = std::iter::once(first).chain(chars.by_ref().take(3)).collect();
                        u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == 4)
                            .and_then(char::from_u32)
                            .ok_or_else(|| {
                                MarcError::InvalidField(format!("Invalid escape '@{hex}'"))
                            })?
                    },
                    None => {
                        return Err(MarcError::InvalidField(
                            "Dangling escape character".to_string(),
                        ))
                    },
                };
                push_value(&mut subfields, unescaped)?;
            },
            other => push_value(&mut subfields, other)?,
        }
    }

    Ok(subfields)
}

fn push_value(subfields: &mut [(char, String)], c: char) -> Result<()> {
    match subfields.last_mut() {
        Some((_, value)) => {
            value.push(c);
            Ok(())
        },
        None => Err(MarcError::InvalidField(
            "Value before first subfield".to_string(),
        )),
    }
}
