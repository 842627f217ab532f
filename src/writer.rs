//! Writing records in ISO 2709 binary format.
//!
//! [`MarcWriter`] is the inverse of [`crate::reader::parse_record`]: it lays
//! out leader, directory and data area and terminates each record with
//! `0x1D`. Values are written as UTF-8. Partitioning never writes ISO 2709;
//! the writer builds ISO 2709 input for tests.
//!
//! # Examples
//!
//! ```
//! use dataio_partitioner::writer::MarcWriter;
//! use dataio_partitioner::{Field, Leader, Record};
//!
//! let mut record = Record::new(Leader::default());
//! let mut field = Field::new("245".to_string(), '0', '0');
//! field.add_subfield('a', "Title".to_string());
//! record.add_field(field);
//!
//! let mut buffer = Vec::new();
//! MarcWriter::new(&mut buffer).write_record(&record)?;
//! assert_eq!(buffer.last(), Some(&0x1D));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{MarcError, Result};
use crate::reader::{FIELD_TERMINATOR, RECORD_TERMINATOR, SUBFIELD_DELIMITER};
use crate::record::Record;
use std::io::Write;

/// Writer for ISO 2709 binary MARC format.
#[derive(Debug)]
pub struct MarcWriter<W: Write> {
    writer: W,
    records_written: usize,
}

impl<W: Write> MarcWriter<W> {
    /// Create a new writer.
    pub fn new(writer: W) -> Self {
        MarcWriter {
            writer,
            records_written: 0,
        }
    }

    /// Write a single record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not fit the ISO 2709 length limits
    /// or an IO error occurs.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        let mut data_area = Vec::new();
        let mut directory = Vec::new();

        for (tag, value) in &record.control_fields {
            let start = data_area.len();
            data_area.extend_from_slice(value.as_bytes());
            data_area.push(FIELD_TERMINATOR);
            push_directory_entry(&mut directory, tag, data_area.len() - start, start)?;
        }

        for field in record.fields() {
            let start = data_area.len();
            data_area.push(field.indicator1 as u8);
            data_area.push(field.indicator2 as u8);
            for subfield in &field.subfields {
                data_area.push(SUBFIELD_DELIMITER);
                data_area.push(subfield.code as u8);
                data_area.extend_from_slice(subfield.value.as_bytes());
            }
            data_area.push(FIELD_TERMINATOR);
            push_directory_entry(&mut directory, &field.tag, data_area.len() - start, start)?;
        }

        directory.push(FIELD_TERMINATOR);

        let base_address = 24 + directory.len();
        let record_length = base_address + data_area.len() + 1;
        if record_length > 99_999 {
            return Err(MarcError::InvalidRecord(format!(
                "Record length {record_length} exceeds 99999 bytes"
            )));
        }

        let mut leader = record.leader.clone();
        leader.record_length = u32::try_from(record_length)
            .map_err(|_| MarcError::InvalidRecord("Record length overflow".to_string()))?;
        leader.data_base_address = u32::try_from(base_address)
            .map_err(|_| MarcError::InvalidRecord("Base address overflow".to_string()))?;

        self.writer.write_all(&leader.as_bytes()?)?;
        self.writer.write_all(&directory)?;
        self.writer.write_all(&data_area)?;
        self.writer.write_all(&[RECORD_TERMINATOR])?;

        self.records_written += 1;
        Ok(())
    }

    /// Returns the number of records written so far.
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.records_written
    }
}

fn push_directory_entry(
    directory: &mut Vec<u8>,
    tag: &str,
    length: usize,
    start: usize,
) -> Result<()> {
    if tag.len() != 3 {
        return Err(MarcError::InvalidField(format!(
            "Tag '{tag}' must be 3 characters"
        )));
    }
    if length > 9999 {
        return Err(MarcError::InvalidField(format!(
            "Tag {tag}: field length {length} exceeds 9999 bytes"
        )));
    }
    directory.extend_from_slice(tag.as_bytes());
    directory.extend_from_slice(format!("{length:04}").as_bytes());
    directory.extend_from_slice(format!("{start:05}").as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Charset;
    use crate::leader::Leader;
    use crate::reader::parse_record;
    use crate::record::Field;

    #[test]
    fn test_write_then_parse_preserves_field_order() {
        let record = Record::builder(Leader::default())
            .control_field_str("001", "id1")
            .field(
                Field::builder("245".to_string(), '1', '0')
                    .subfield_str('a', "Title")
                    .subfield_str('c', "Author")
                    .build(),
            )
            .field(
                Field::builder("650".to_string(), ' ', '0')
                    .subfield_str('a', "Subject")
                    .build(),
            )
            .build();

        let mut buffer = Vec::new();
        let mut writer = MarcWriter::new(&mut buffer);
        writer.write_record(&record).unwrap();
        assert_eq!(writer.records_written(), 1);

        let parsed = parse_record(&buffer, Charset::Utf8).unwrap();
        let tags: Vec<_> = parsed.fields().map(|f| f.tag.as_str()).collect();
        assert_eq!(tags, vec!["245", "650"]);
        assert_eq!(parsed.get_control_field("001"), Some("id1"));
        assert_eq!(parsed.leader.record_length as usize, buffer.len());
    }

    #[test]
    fn test_rejects_bad_tag() {
        let record = Record::builder(Leader::default())
            .field(Field::new("24".to_string(), ' ', ' '))
            .build();
        let mut buffer = Vec::new();
        assert!(MarcWriter::new(&mut buffer).write_record(&record).is_err());
    }
}
