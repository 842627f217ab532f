//! danMARC2 line format partitioning.

use super::{failed_item, DataPartitioner, DataPartitionerResult};
use crate::chunk_item::{ChunkItem, ChunkItemType};
use crate::counting::CountingReader;
use crate::encoding::Charset;
use crate::error::PartitionResult;
use crate::line_format::{parse_record, LineFormatReader, RawLineRecord};
use crate::marcxchange;
use crate::record_info::RecordInfo;
use log::warn;
use std::io::{BufReader, Read};

/// Partitioner producing one MarcXchange document per line format record.
#[derive(Debug)]
pub struct LineFormatDataPartitioner<R: Read> {
    reader: LineFormatReader<CountingReader<BufReader<R>>>,
    as_collection: bool,
    position: u64,
}

impl<R: Read> LineFormatDataPartitioner<R> {
    /// Create a partitioner decoding lines with `encoding`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PartitionerError::InvalidEncoding`] for an unknown
    /// encoding.
    pub fn new(input: R, encoding: &str) -> PartitionResult<Self> {
        let charset = Charset::for_name(encoding)?;
        Ok(LineFormatDataPartitioner {
            reader: LineFormatReader::new(CountingReader::new(BufReader::new(input)), charset),
            as_collection: false,
            position: 0,
        })
    }

    /// Create a partitioner wrapping every record in a `<collection>`.
    ///
    /// # Errors
    ///
    /// As for [`LineFormatDataPartitioner::new`].
    pub fn collection(input: R, encoding: &str) -> PartitionResult<Self> {
        let mut partitioner = Self::new(input, encoding)?;
        partitioner.as_collection = true;
        Ok(partitioner)
    }

    fn process(&self, raw: RawLineRecord) -> (ChunkItem, Option<RecordInfo>) {
        let record = match parse_record(&raw.lines) {
            Ok(record) => record,
            Err(e) => {
                warn!("Invalid line format record at position {}: {e}", self.position);
                return (
                    failed_item(raw.bytes, ChunkItemType::Bytes, "Invalid line format record", &e),
                    None,
                );
            },
        };

        if record.is_empty() {
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
            Err(e) => (
                failed_item(raw.bytes, ChunkItemType::Bytes, "Unable to write MarcXchange", &e),
                None,
            ),
        }
    }
}

impl<R: Read + std::fmt::Debug> DataPartitioner for LineFormatDataPartitioner<R> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_item::ChunkItemStatus;
    use crate::record_info::RecordType;
    use std::io::Cursor;

    const INPUT: &str = "001 00 *a11111111*b870970\n004 00 *rh*ae\n$\n\
                         001 00 *a22222222\n245 00 *abad @zz\n$\n\
                         $\n\
                         001 00 *a33333333*b870970\n004 00 *rb*ae\n014 00 *a11111111\n$\n";

    #[test]
    fn test_partitions_records() {
        let mut partitioner = LineFormatDataPartitioner::new(Cursor::new(INPUT), "utf-8").unwrap();
        let results: Vec<_> = partitioner.results().map(Result::unwrap).collect();

        let statuses: Vec<_> = results
            .iter()
            .map(|r| r.chunk_item.as_ref().unwrap().status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                ChunkItemStatus::Success,
                ChunkItemStatus::Failure,
                ChunkItemStatus::Ignore,
                ChunkItemStatus::Success,
            ]
        );
        assert_eq!(
            results.iter().map(|r| r.position).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );

        assert_eq!(
            results[0].record_info.as_ref().unwrap().record_type,
            RecordType::Head
        );
        assert_eq!(
            results[1].chunk_item.as_ref().unwrap().data_as_string(),
            "001 00 *a22222222\n245 00 *abad @zz\n$\n"
        );
        let volume = results[3].record_info.as_ref().unwrap();
        assert_eq!(volume.parent_relation.as_deref(), Some("11111111"));
        assert_eq!(partitioner.bytes_read(), INPUT.len() as u64);
    }

    #[test]
    fn test_collection_variant() {
        let mut partitioner =
            LineFormatDataPartitioner::collection(Cursor::new(INPUT), "utf-8").unwrap();
        let first = partitioner.next_result().unwrap().unwrap();
        assert!(first
            .chunk_item
            .unwrap()
            .data_as_string()
            .contains("<collection xmlns=\"info:lc/xmlns/marcxchange-v1\">"));
    }
}
