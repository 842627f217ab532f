//! Addi envelope partitioning.
//!
//! An Addi stream is a sequence of metadata/content pairs, each part framed
//! by its decimal length:
//!
//! ```text
//! <len>\n<metadata>\n<len>\n<content>\n
//! ```
//!
//! Metadata is JSON (`trackingId`, `pid`, `diagnostic`). What the content is
//! depends on the job; a [`RecordInfoExtractor`] decides whether records can
//! be classified for reordering.

use super::{failed_item, DataPartitioner, DataPartitionerResult};
use crate::chunk_item::{ChunkItem, ChunkItemType, Diagnostic};
use crate::counting::CountingReader;
use crate::encoding::Charset;
use crate::error::{MarcError, PartitionResult, PartitionerError, Result};
use crate::marcxchange;
use crate::record_info::RecordInfo;
use log::{debug, warn};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

/// Hook classifying the content of Addi records.
pub trait RecordInfoExtractor: std::fmt::Debug {
    /// Type tags of successfully parsed chunk items.
    fn chunk_item_types(&self) -> Vec<ChunkItemType>;

    /// Classify `content`.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be interpreted; the record is
    /// then reported as failed.
    fn extract(&self, content: &[u8], charset: Charset) -> Result<Option<RecordInfo>>;
}

/// Extractor for opaque content. Never classifies.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericAddi;

impl RecordInfoExtractor for GenericAddi {
    fn chunk_item_types(&self) -> Vec<ChunkItemType> {
        vec![ChunkItemType::Addi]
    }

    fn extract(&self, _content: &[u8], _charset: Charset) -> Result<Option<RecordInfo>> {
        Ok(None)
    }
}

/// Extractor for MarcXchange content.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarcXchangeAddi;

impl RecordInfoExtractor for MarcXchangeAddi {
    fn chunk_item_types(&self) -> Vec<ChunkItemType> {
        vec![ChunkItemType::Addi, ChunkItemType::Marcxchange]
    }

    fn extract(&self, content: &[u8], charset: Charset) -> Result<Option<RecordInfo>> {
        let xml = charset
            .decode(content)
            .map_err(|e| MarcError::EncodingError(e.to_string()))?;
        let records = marcxchange::marcxchange_to_records(&xml)?;
        let record = records
            .first()
            .ok_or_else(|| MarcError::InvalidRecord("No record in MarcXchange content".to_string()))?;
        Ok(RecordInfo::from_record(record))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddiMetaData {
    #[serde(default)]
    tracking_id: Option<String>,
    #[serde(default)]
    pid: Option<String>,
    #[serde(default)]
    diagnostic: Option<Diagnostic>,
}

/// One framed Addi record.
#[derive(Debug)]
struct AddiUnit {
    raw: Vec<u8>,
    meta_range: std::ops::Range<usize>,
    content_range: std::ops::Range<usize>,
}

impl AddiUnit {
    fn meta(&self) -> &[u8] {
        &self.raw[self.meta_range.clone()]
    }

    fn content(&self) -> &[u8] {
        &self.raw[self.content_range.clone()]
    }
}

/// Partitioner producing one result per Addi record.
#[derive(Debug)]
pub struct AddiDataPartitioner<R: Read, E: RecordInfoExtractor = GenericAddi> {
    reader: CountingReader<BufReader<R>>,
    charset: Charset,
    extractor: E,
    position: u64,
}

impl<R: Read> AddiDataPartitioner<R, GenericAddi> {
    /// Partitioner for opaque Addi content.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::InvalidEncoding`] for an unknown encoding.
    pub fn new(input: R, encoding: &str) -> PartitionResult<Self> {
        Self::with_extractor(input, encoding, GenericAddi)
    }
}

impl<R: Read> AddiDataPartitioner<R, MarcXchangeAddi> {
    /// Partitioner for Addi records wrapping MarcXchange.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::InvalidEncoding`] for an unknown encoding.
    pub fn marcxchange(input: R, encoding: &str) -> PartitionResult<Self> {
        Self::with_extractor(input, encoding, MarcXchangeAddi)
    }
}

impl<R: Read, E: RecordInfoExtractor> AddiDataPartitioner<R, E> {
    /// Partitioner with a custom extractor.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::InvalidEncoding`] for an unknown encoding.
    pub fn with_extractor(input: R, encoding: &str, extractor: E) -> PartitionResult<Self> {
        Ok(AddiDataPartitioner {
            reader: CountingReader::new(BufReader::new(input)),
            charset: Charset::for_name(encoding)?,
            extractor,
            position: 0,
        })
    }

    /// Read the next framed record, or `None` at a clean end of input.
    fn read_unit(&mut self) -> PartitionResult<Option<AddiUnit>> {
        let mut raw = Vec::new();
        let Some(meta_range) = self.read_part(&mut raw, true)? else {
            return Ok(None);
        };
        let Some(content_range) = self.read_part(&mut raw, false)? else {
            return Ok(None);
        };
        Ok(Some(AddiUnit {
            raw,
            meta_range,
            content_range,
        }))
    }

    /// Append one `<len>\n<bytes>\n` part to `raw` and return the range of
    /// its bytes.
    fn read_part(
        &mut self,
        raw: &mut Vec<u8>,
        eof_allowed: bool,
    ) -> PartitionResult<Option<std::ops::Range<usize>>> {
        let mut length_line = Vec::new();
        if self.reader.read_until(b'\n', &mut length_line)? == 0 {
            if eof_allowed {
                return Ok(None);
            }
            return Err(PartitionerError::PrematureEndOfData(
                "Addi record ends before content length".to_string(),
            ));
        }
        if length_line.last() != Some(&b'\n') {
            return Err(PartitionerError::PrematureEndOfData(
                "Addi length line is not terminated".to_string(),
            ));
        }
        let length: usize = std::str::from_utf8(&length_line[..length_line.len() - 1])
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| {
                PartitionerError::InvalidData(format!(
                    "Invalid Addi length line '{}'",
                    String::from_utf8_lossy(&length_line).trim_end()
                ))
            })?;
        // Declared length plus the trailing line break.
        let part_len = length
            .checked_add(1)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                PartitionerError::InvalidData(format!("Addi length {length} is out of range"))
            })?;
        raw.extend_from_slice(&length_line);

        let start = raw.len();
        let read = (&mut self.reader).take(part_len).read_to_end(raw)?;
        if (read as u64) < part_len {
            return Err(PartitionerError::PrematureEndOfData(format!(
                "Addi part shorter than declared {length} bytes"
            )));
        }
        if raw.last() != Some(&b'\n') {
            return Err(PartitionerError::InvalidData(format!(
                "Addi part of {length} bytes is not followed by a line break"
            )));
        }
        Ok(Some(start..start + length))
    }

    fn process(&self, unit: AddiUnit) -> (ChunkItem, Option<RecordInfo>) {
        if unit.meta().is_empty() && unit.content().is_empty() {
            return (ChunkItem::ignored("Empty Addi record"), None);
        }

        let meta: AddiMetaData = match serde_json::from_slice(unit.meta()) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Invalid Addi metadata at position {}: {e}", self.position);
                return (
                    failed_item(unit.raw, ChunkItemType::Bytes, "Invalid Addi metadata", &e),
                    None,
                );
            },
        };
        if let Some(pid) = &meta.pid {
            debug!("Addi record {} has pid {pid}", self.position);
        }

        let types = self.extractor.chunk_item_types();

        if let Some(diagnostic) = meta.diagnostic {
            let record_info = self
                .extractor
                .extract(unit.content(), self.charset)
                .ok()
                .flatten();
            let mut item = ChunkItem::failed(unit.raw, ChunkItemType::Addi)
                .with_encoding(self.charset.name())
                .with_tracking_id(meta.tracking_id)
                .with_diagnostic(diagnostic);
            item.types = types;
            return (item, record_info);
        }

        match self.extractor.extract(unit.content(), self.charset) {
            Ok(record_info) => (
                ChunkItem::successful_with_types(unit.raw, types)
                    .with_encoding(self.charset.name())
                    .with_tracking_id(meta.tracking_id),
                record_info,
            ),
            Err(e) => {
                warn!("Unable to classify Addi content at position {}: {e}", self.position);
                let mut item = failed_item(unit.raw, ChunkItemType::Addi, "Invalid Addi content", &e)
                    .with_encoding(self.charset.name())
                    .with_tracking_id(meta.tracking_id);
                item.types = types;
                (item, None)
            },
        }
    }
}

impl<R: Read + std::fmt::Debug, E: RecordInfoExtractor> DataPartitioner for AddiDataPartitioner<R, E> {
    fn encoding(&self) -> Charset {
        self.charset
    }

    fn bytes_read(&self) -> u64 {
        self.reader.bytes_read()
    }

    fn next_result(&mut self) -> PartitionResult<Option<DataPartitionerResult>> {
        let Some(unit) = self.read_unit()? else {
            return Ok(None);
        };
        let (chunk_item, record_info) = self.process(unit);
        let result = DataPartitionerResult::new(chunk_item, record_info, self.position);
        self.position += 1;
        Ok(Some(result))
    }
}
