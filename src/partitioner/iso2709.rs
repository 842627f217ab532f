//! ISO 2709 partitioning.
//!
//! Raw records are cut on the record terminator before any parsing, so a
//! record with a broken leader or directory is reported as a failed chunk
//! item holding its exact bytes while the following records still parse.

use super::{failed_item, DataPartitioner, DataPartitionerResult};
use crate::chunk_item::{ChunkItem, ChunkItemType};
use crate::counting::CountingReader;
use crate::encoding::Charset;
use crate::error::PartitionResult;
use crate::marcxchange;
use crate::reader::{parse_record, MarcReader};
use crate::record_info::RecordInfo;
use log::{debug, error};
use std::io::{BufReader, Read};

/// Partitioner producing one MarcXchange document per ISO 2709 record.
#[derive(Debug)]
pub struct Iso2709DataPartitioner<R: Read> {
    reader: MarcReader<CountingReader<BufReader<R>>>,
    charset: Charset,
    as_collection: bool,
    position: u64,
}

impl<R: Read> Iso2709DataPartitioner<R> {
    /// Create a partitioner decoding field values with `encoding`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartitionerError::InvalidEncoding`] for an unknown
    /// encoding.
    pub fn new(input: R, encoding: &str) -> PartitionResult<Self> {
        Ok(Iso2709DataPartitioner {
            reader: MarcReader::new(CountingReader::new(BufReader::new(input))),
            charset: Charset::for_name(encoding)?,
            as_collection: false,
            position: 0,
        })
    }

    /// Create a partitioner wrapping every record in a `<collection>`.
    ///
    /// # Errors
    ///
    /// As for [`Iso2709DataPartitioner::new`].
    pub fn collection(input: R, encoding: &str) -> PartitionResult<Self> {
        let mut partitioner = Self::new(input, encoding)?;
        partitioner.as_collection = true;
        Ok(partitioner)
    }

    fn process(&self, raw: Vec<u8>) -> (ChunkItem, Option<RecordInfo>) {
        let record = match parse_record(&raw, self.charset) {
            Ok(record) => record,
            Err(e) => {
                error!("Invalid ISO 2709 record at position {}: {e}", self.position);
                return (
                    failed_item(raw, ChunkItemType::Bytes, "Invalid ISO 2709 record", &e),
                    None,
                );
            },
        };

        if record.is_empty() {
            debug!("Empty ISO 2709 record at position {}", self.position);
            return (ChunkItem::ignored("Empty record"), None);
        }

        let payload = if self.as_collection {
            marcxchange::records_to_collection(std::slice::from_ref(&record))
        } else {
            marcxchange::record_to_marcxchange(&record)
        };
        match payload {
            Ok(xml) => (
                ChunkItem::successful(xml, ChunkItemType::Marcxchange),
                RecordInfo::from_record(&record),
            ),
            Err(e) => {
                error!("Unable to write record at position {}: {e}", self.position);
                (
                    failed_item(raw, ChunkItemType::Bytes, "Unable to write MarcXchange", &e),
                    None,
                )
            },
        }
    }
}

impl<R: Read + std::fmt::Debug> DataPartitioner for Iso2709DataPartitioner<R> {
    fn encoding(&self) -> Charset {
        Charset::Utf8
    }

    fn bytes_read(&self) -> u64 {
        self.reader.get_ref().bytes_read()
    }

    fn next_result(&mut self) -> PartitionResult<Option<DataPartitionerResult>> {
        let Some(raw) = self.reader.read_raw_record()? else {
            return Ok(None);
        };
        let (chunk_item, record_info) = self.process(raw);
        let result = DataPartitionerResult::new(chunk_item, record_info, self.position);
        self.position += 1;
        Ok(Some(result))
    }
}
