//! Line-oriented CSV partitioning.
//!
//! A CSV reader cannot skip a broken row and carry on, so every line is read
//! on its own and parsed as a one-row CSV document. Parsed rows are
//! transcoded to `<csv><line><C0>..</C0><C1>..</C1></line></csv>` so that
//! downstream processing treats them like any other generic XML.

use super::{failed_item, DataPartitioner, DataPartitionerResult};
use crate::chunk_item::{ChunkItem, ChunkItemType, Diagnostic};
use crate::counting::CountingReader;
use crate::encoding::Charset;
use crate::error::{PartitionResult, PartitionerError};
use ::csv::{ReaderBuilder, StringRecord};
use log::{debug, warn};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt::Display;
use std::io::{BufRead, BufReader, Read};

/// Flavours of CSV exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvDialect {
    /// Comma separated, no header row
    Standard,
    /// VIP exports: semicolon separated, no header row
    Vip,
    /// DSD exports: comma separated with a header row
    Dsd,
}

impl CsvDialect {
    /// Field delimiter byte.
    #[must_use]
    pub fn delimiter(self) -> u8 {
        match self {
            CsvDialect::Standard | CsvDialect::Dsd => b',',
            CsvDialect::Vip => b';',
        }
    }

    /// Whether the first line names the columns.
    #[must_use]
    pub fn has_header(self) -> bool {
        self == CsvDialect::Dsd
    }
}

/// Partitioner producing one result per CSV line.
#[derive(Debug)]
pub struct CsvDataPartitioner<R: Read> {
    reader: CountingReader<BufReader<R>>,
    charset: Charset,
    dialect: CsvDialect,
    header_pending: bool,
    position: u64,
}

impl<R: Read> CsvDataPartitioner<R> {
    /// Standard comma separated partitioner.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::InvalidEncoding`] for an unknown encoding.
    pub fn new(input: R, encoding: &str) -> PartitionResult<Self> {
        Self::with_dialect(input, encoding, CsvDialect::Standard)
    }

    /// Partitioner for the given dialect.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionerError::InvalidEncoding`] for an unknown encoding.
    pub fn with_dialect(input: R, encoding: &str, dialect: CsvDialect) -> PartitionResult<Self> {
        Ok(CsvDataPartitioner {
            reader: CountingReader::new(BufReader::new(input)),
            charset: Charset::for_name(encoding)?,
            dialect,
            header_pending: dialect.has_header(),
            position: 0,
        })
    }

    /// Next line, decoded and without its line ending.
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

    fn parse_line(&self, line: &str, position: u64) -> PartitionResult<DataPartitionerResult> {
        if line.trim().is_empty() {
            return Ok(DataPartitionerResult::new(
                ChunkItem::ignored(line.as_bytes().to_vec()),
                None,
                position,
            ));
        }

        if line.bytes().filter(|&b| b == b'"').count() % 2 != 0 {
            warn!("CSV line {position} has unbalanced quotes");
            let item = ChunkItem::failed(line.as_bytes().to_vec(), ChunkItemType::String)
                .with_diagnostic(Diagnostic::fatal(format!(
                    "Unbalanced quotes in CSV line {position}"
                )));
            return Ok(DataPartitionerResult::new(item, None, position));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .delimiter(self.dialect.delimiter())
            .from_reader(line.as_bytes());
        let mut row = StringRecord::new();
        let item = match reader.read_record(&mut row) {
            Ok(true) => ChunkItem::successful(row_to_xml(&row)?, ChunkItemType::GenericXml),
            Ok(false) => ChunkItem::ignored(line.as_bytes().to_vec()),
            Err(e) => {
                warn!("CSV line {position} rejected: {e}");
                failed_item(line, ChunkItemType::String, "Invalid CSV line", &e)
            },
        };
        Ok(DataPartitionerResult::new(item, None, position))
    }
}

impl<R: Read + std::fmt::Debug> DataPartitioner for CsvDataPartitioner<R> {
    fn encoding(&self) -> Charset {
        Charset::Utf8
    }

    fn bytes_read(&self) -> u64 {
        self.reader.bytes_read()
    }

    fn next_result(&mut self) -> PartitionResult<Option<DataPartitionerResult>> {
        if self.header_pending {
            self.header_pending = false;
            match self.read_line()? {
                Some(header) => debug!("Skipping CSV header: {header}"),
                None => return Ok(None),
            }
        }

        let Some(line) = self.read_line()? else {
            return Ok(None);
        };
        let position = self.position;
        self.position += 1;
        self.parse_line(&line, position).map(Some)
    }
}

fn xml_write_error(e: impl Display) -> PartitionerError {
    PartitionerError::InvalidData(format!("Unable to transcode CSV line: {e}"))
}

fn row_to_xml(row: &StringRecord) -> PartitionResult<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Start(BytesStart::new("csv")))
        .map_err(xml_write_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("line")))
        .map_err(xml_write_error)?;
    for (i, value) in row.iter().enumerate() {
        let name = format!("C{i}");
        writer
            .write_event(Event::Start(BytesStart::new(name.as_str())))
            .map_err(xml_write_error)?;
        writer
            .write_event(Event::Text(BytesText::new(value)))
            .map_err(xml_write_error)?;
        writer
            .write_event(Event::End(BytesEnd::new(name.as_str())))
            .map_err(xml_write_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("line")))
        .map_err(xml_write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("csv")))
        .map_err(xml_write_error)?;
    Ok(writer.into_inner())
}
