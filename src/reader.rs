//! Reading ISO 2709 records from binary streams.
//!
//! [`MarcReader`] slices a stream into raw records on the record terminator
//! (`0x1D`) without interpreting them, so that a broken directory in one
//! record never prevents locating the next one. [`parse_record`] turns one
//! raw unit into a [`Record`], decoding field values through a [`Charset`].
//!
//! # Examples
//!
//! ```
//! use dataio_partitioner::reader::MarcReader;
//! use std::io::Cursor;
//!
//! let mut reader = MarcReader::new(Cursor::new(Vec::new()));
//! assert!(reader.read_raw_record()?.is_none());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::encoding::Charset;
use crate::error::{MarcError, PartitionResult, PartitionerError, Result};
use crate::leader::Leader;
use crate::record::{Field, Record};
use std::io::BufRead;

pub(crate) const FIELD_TERMINATOR: u8 = 0x1E;
pub(crate) const SUBFIELD_DELIMITER: u8 = 0x1F;
pub(crate) const RECORD_TERMINATOR: u8 = 0x1D;

/// Reader yielding raw ISO 2709 records.
#[derive(Debug)]
pub struct MarcReader<R: BufRead> {
    reader: R,
    records_read: usize,
}

impl<R: BufRead> MarcReader<R> {
    /// Create a new reader over a buffered source.
    pub fn new(reader: R) -> Self {
        MarcReader {
            reader,
            records_read: 0,
        }
    }

    /// Read the bytes of the next record, terminator included.
    ///
    /// Line breaks between records are skipped. Returns `Ok(None)` at end of
    /// input.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::PrematureEndOfData`] if the input ends
    /// inside a record, or an IO error from the source.
    pub fn read_raw_record(&mut self) -> PartitionResult<Option<Vec<u8>>> {
        self.skip_line_breaks()?;

        let mut raw = Vec::new();
        let n = self.reader.read_until(RECORD_TERMINATOR, &mut raw)?;
        if n == 0 {
            return Ok(None);
        }
        if raw.last() != Some(&RECORD_TERMINATOR) {
            return Err(PartitionerError::PrematureEndOfData(format!(
                "record {} ends after {} bytes without record terminator",
                self.records_read + 1,
                raw.len()
            )));
        }

        self.records_read += 1;
        Ok(Some(raw))
    }

    /// Read and parse the next record.
    ///
    /// # Errors
    ///
    /// Stream errors are returned as in [`MarcReader::read_raw_record`]; a
    /// record that fails to parse is reported as [`PartitionerError::InvalidData`].
    pub fn read_record(&mut self, charset: Charset) -> PartitionResult<Option<Record>> {
        match self.read_raw_record()? {
            Some(raw) => parse_record(&raw, charset)
                .map(Some)
                .map_err(|e| PartitionerError::InvalidData(e.to_string())),
            None => Ok(None),
        }
    }

    /// Number of raw records read so far.
    #[must_use]
    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Mutably borrow the underlying source.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    fn skip_line_breaks(&mut self) -> PartitionResult<()> {
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(());
            }
            let skip = buf
                .iter()
                .take_while(|&&b| b == b'\r' || b == b'\n')
                .count();
            let exhausted = skip == buf.len();
            self.reader.consume(skip);
            if !exhausted {
                return Ok(());
            }
        }
    }
}

/// Parse one raw ISO 2709 record.
///
/// Tags below `010` whose data contains no subfield delimiter become control
/// fields; anything else is parsed as a data field, which keeps danMARC2
/// `001`-`009` fields with subfields intact.
///
/// # Errors
///
/// Returns an error if the leader, directory or a field is malformed, or a
/// value cannot be decoded with `charset`.
pub fn parse_record(raw: &[u8], charset: Charset) -> Result<Record> {
    if raw.len() < 24 {
        return Err(MarcError::TruncatedRecord(format!(
            "{} bytes is shorter than a leader",
            raw.len()
        )));
    }

    let leader = Leader::from_bytes(&raw[..24])?;
    leader.validate_for_reading()?;

    let base_address = leader.data_base_address as usize;
    if base_address > raw.len() {
        return Err(MarcError::InvalidRecord(format!(
            "Base address {base_address} beyond end of record ({} bytes)",
            raw.len()
        )));
    }

    let directory = &raw[24..base_address];
    let data = &raw[base_address..];
    let mut record = Record::new(leader);

    // Directory entries: tag(3) + length(4) + start position(5)
    let mut pos = 0;
    while pos < directory.len() {
        if directory[pos] == FIELD_TERMINATOR {
            break;
        }
        if pos + 12 > directory.len() {
            return Err(MarcError::InvalidRecord(
                "Incomplete directory entry".to_string(),
            ));
        }

        let entry = &directory[pos..pos + 12];
        let tag = String::from_utf8_lossy(&entry[0..3]).to_string();
        let field_length = parse_number(&entry[3..7])?;
        let start_position = parse_number(&entry[7..12])?;
        pos += 12;

        let end_position = start_position + field_length;
        if end_position > data.len() {
            return Err(MarcError::InvalidRecord(format!(
                "Field {tag} exceeds data area"
            )));
        }
        let field_data = &data[start_position..end_position];

        if is_control_tag(&tag) && !field_data.contains(&SUBFIELD_DELIMITER) {
            let value = strip_terminator(field_data);
            record.add_control_field(tag, decode(charset, value)?);
        } else {
            let field = parse_data_field(field_data, &tag, charset)
                .map_err(|e| MarcError::InvalidField(format!("Tag {tag}: {e}")))?;
            record.add_field(field);
        }
    }

    Ok(record)
}

fn is_control_tag(tag: &str) -> bool {
    tag.len() == 3 && tag.bytes().all(|b| b.is_ascii_digit()) && tag < "010"
}

fn strip_terminator(data: &[u8]) -> &[u8] {
    match data.last() {
        Some(&FIELD_TERMINATOR) => &data[..data.len() - 1],
        _ => data,
    }
}

fn decode(charset: Charset, bytes: &[u8]) -> Result<String> {
    charset
        .decode(bytes)
        .map_err(|e| MarcError::EncodingError(e.to_string()))
}

fn parse_data_field(data: &[u8], tag: &str, charset: Charset) -> Result<Field> {
    if data.len() < 2 {
        return Err(MarcError::InvalidField(
            "Data field too short (needs indicators)".to_string(),
        ));
    }

    let mut field = Field::new(tag.to_string(), data[0] as char, data[1] as char);
    let subfield_data = strip_terminator(&data[2..]);

    if subfield_data.is_empty() {
        return Ok(field);
    }
    if subfield_data[0] != SUBFIELD_DELIMITER {
        return Err(MarcError::InvalidField(
            "Expected subfield delimiter".to_string(),
        ));
    }

    for chunk in subfield_data[1..].split(|&b| b == SUBFIELD_DELIMITER) {
        let Some((&code, value)) = chunk.split_first() else {
            return Err(MarcError::InvalidField(
                "Subfield delimiter without code".to_string(),
            ));
        };
        field.add_subfield(code as char, decode(charset, value)?);
    }

    Ok(field)
}

/// Parse an ASCII decimal number from bytes
fn parse_number(bytes: &[u8]) -> Result<usize> {
    let mut result = 0usize;
    for &byte in bytes {
        if byte.is_ascii_digit() {
            result = result * 10 + (byte - b'0') as usize;
        } else {
            return Err(MarcError::InvalidRecord(format!(
                "Invalid numeric field: expected digits, got byte {}",
                byte as char
            )));
        }
    }
    Ok(result)
}
