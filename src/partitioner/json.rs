//! JSON lines partitioning: one JSON document per line.

use super::{failed_item, DataPartitioner, DataPartitionerResult};
use crate::chunk_item::{ChunkItem, ChunkItemType};
use crate::counting::CountingReader;
use crate::encoding::Charset;
use crate::error::{PartitionResult, PartitionerError};
use log::warn;
use serde_json::Value;
use std::io::{BufRead, BufReader, Read};

/// Partitioner producing one compact JSON document per input line.
#[derive(Debug)]
pub struct JsonDataPartitioner<R: Read> {
    reader: CountingReader<BufReader<R>>,
    charset: Charset,
    position: u64,
}

impl<R: Read> JsonDataPartitioner<R> {
    /// Create a partitioner decoding lines with `encoding`.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::InvalidEncoding`] for an unknown encoding.
    pub fn new(input: R, encoding: &str) -> PartitionResult<Self> {
        Ok(JsonDataPartitioner {
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

    fn parse_line(&self, line: String) -> PartitionResult<ChunkItem> {
        if line.trim().is_empty() {
            return Ok(ChunkItem::ignored(line));
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(document) => {
                let compact = serde_json::to_vec(&document).map_err(|e| {
                    PartitionerError::InvalidData(format!("Unable to write JSON document: {e}"))
                })?;
                Ok(ChunkItem::successful(compact, ChunkItemType::Json))
            },
            Err(e) => {
                warn!("Invalid JSON at position {}: {e}", self.position);
                Ok(failed_item(line, ChunkItemType::String, "Invalid JSON document", &e))
            },
        }
    }
}

impl<R: Read + std::fmt::Debug> DataPartitioner for JsonDataPartitioner<R> {
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
        let item = self.parse_line(line)?;
        let result = DataPartitionerResult::new(item, None, self.position);
        self.position += 1;
        Ok(Some(result))
    }
}
