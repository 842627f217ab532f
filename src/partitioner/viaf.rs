//! VIAF dump partitioning.
//!
//! VIAF clusters are exported as one MARC21-slim `<record>` per line,
//! optionally prefixed by the VIAF id and a tab. Each record is re-emitted as
//! MarcXchange.

use super::{failed_item, DataPartitioner, DataPartitionerResult};
use crate::chunk_item::{ChunkItem, ChunkItemType};
use crate::counting::CountingReader;
use crate::encoding::Charset;
use crate::error::{MarcError, PartitionResult};
use crate::marcxchange;
use crate::record::Record;
use crate::record_info::RecordInfo;
use log::{debug, warn};
use std::io::{BufRead, BufReader, Read};

/// Partitioner producing one MarcXchange document per VIAF line.
#[derive(Debug)]
pub struct ViafDataPartitioner<R: Read> {
    reader: CountingReader<BufReader<R>>,
    charset: Charset,
    position: u64,
}

impl<R: Read> ViafDataPartitioner<R> {
    /// Create a partitioner decoding lines with `encoding`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartitionerError::InvalidEncoding`] for an unknown
    /// encoding.
    pub fn new(input: R, encoding: &str) -> PartitionResult<Self> {
        Ok(ViafDataPartitioner {
            reader: CountingReader::new(BufReader::new(input)),
            charset: Charset::for_name(encoding)?,
            position: 0,
        })
    }

    fn read_line(&mut self) -> PartitionResult<Option<String>> {
        let mut raw = Vec::new();
        if self.reader.read_until(b'\n', &mut raw)? == 0 {
            return Ok(None);
        }
        while matches!(raw.last(), Some(b'\n' | b'\r')) {
            raw.pop();
        }
        self.charset.decode(&raw).map(Some)
    }

    fn process(&self, line: String) -> (ChunkItem, Option<RecordInfo>) {
        if line.trim().is_empty() {
            return (ChunkItem::ignored(line), None);
        }

        let xml = match line.split_once('\t') {
            Some((viaf_id, xml)) => {
                debug!("VIAF cluster {viaf_id} at position {}", self.position);
                xml
            },
            None => line.as_str(),
        };

        match parse_viaf_record(xml) {
            Ok(record) => match marcxchange::record_to_marcxchange(&record) {
                Ok(payload) => (
                    ChunkItem::successful(payload, ChunkItemType::Marcxchange),
                    RecordInfo::from_record(&record),
                ),
                Err(e) => (
                    failed_item(line, ChunkItemType::String, "Unable to write MarcXchange", &e),
                    None,
                ),
            },
            Err(e) => {
                warn!("Invalid VIAF record at position {}: {e}", self.position);
                (
                    failed_item(line, ChunkItemType::String, "Invalid VIAF record", &e),
                    None,
                )
            },
        }
    }
}

fn parse_viaf_record(xml: &str) -> crate::error::Result<Record> {
    marcxchange::marcxchange_to_records(xml)?
        .into_iter()
        .next()
        .ok_or_else(|| MarcError::InvalidRecord("Empty VIAF collection".to_string()))
}

impl<R: Read + std::fmt::Debug> DataPartitioner for ViafDataPartitioner<R> {
    fn encoding(&self) -> Charset {
        Charset::Utf8
    }

    fn bytes_read(&self) -> u64 {
        self.reader.bytes_read()
    }

    fn next_result(&mut self) -> PartitionResult<Option<DataPartitionerResult>> {
        let Some(line) = self.read_line()? else {
            return Ok(None);
        };
        let (chunk_item, record_info) = self.process(line);
        let result = DataPartitionerResult::new(chunk_item, record_info, self.position);
        self.position += 1;
        Ok(Some(result))
    }
}
