//! Lazy, single-pass partitioning of data streams into per-record results.
//!
//! Every input format has a [`DataPartitioner`] turning raw units (a line, an
//! ISO 2709 record, an XML element, an Addi envelope) into
//! [`DataPartitionerResult`]s. A malformed unit never aborts the pass: it
//! becomes a failed [`ChunkItem`] and the next unit is parsed. Only problems
//! with the stream as a whole surface as [`PartitionerError`]s.
//!
//! Partitioners compose: [`ReorderingDataPartitioner`] fixes the delivery
//! order of hierarchical records and [`IncludeFilterDataPartitioner`] replays
//! a subset of positions. [`factory::create_data_partitioner`] builds the
//! right stack for a job.
//!
//! # Examples
//!
//! ```
//! use dataio_partitioner::partitioner::{CsvDataPartitioner, DataPartitioner};
//! use std::io::Cursor;
//!
//! let mut partitioner = CsvDataPartitioner::new(Cursor::new("a,b\nc,d\n"), "utf-8")?;
//! let mut positions = Vec::new();
//! for result in partitioner.results() {
//!     positions.push(result?.position);
//! }
//! assert_eq!(positions, vec![0, 1]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`PartitionerError`]: crate::error::PartitionerError

pub mod addi;
pub mod archive;
pub mod csv;
pub mod factory;
pub mod include_filter;
pub mod iso2709;
pub mod json;
pub mod line_format;
pub mod reordering;
pub mod viaf;
pub mod xml;

pub use self::addi::{AddiDataPartitioner, RecordInfoExtractor};
pub use self::archive::{TarredXmlDataPartitioner, ZippedXmlDataPartitioner};
pub use self::csv::{CsvDataPartitioner, CsvDialect};
pub use self::include_filter::{IncludeFilterDataPartitioner, PositionSet};
pub use self::iso2709::Iso2709DataPartitioner;
pub use self::json::JsonDataPartitioner;
pub use self::line_format::LineFormatDataPartitioner;
pub use self::reordering::ReorderingDataPartitioner;
pub use self::viaf::ViafDataPartitioner;
pub use self::xml::XmlDataPartitioner;

use crate::chunk_item::{ChunkItem, ChunkItemType, Diagnostic};
use crate::encoding::Charset;
use crate::error::PartitionResult;
use crate::record_info::RecordInfo;
use std::error::Error as StdError;

/// One step of a partitioning pass.
///
/// [`DataPartitionerResult::EMPTY`] carries neither chunk item nor record
/// info and means "nothing at this step". End of data is signalled by
/// [`DataPartitioner::next_result`] returning `Ok(None)` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPartitionerResult {
    /// Outcome of parsing the unit
    pub chunk_item: Option<ChunkItem>,
    /// Classification of the record, for formats that can classify
    pub record_info: Option<RecordInfo>,
    /// Zero-based index of the raw unit in the input
    pub position: u64,
}

impl DataPartitionerResult {
    /// The "nothing at this step" value.
    pub const EMPTY: DataPartitionerResult = DataPartitionerResult {
        chunk_item: None,
        record_info: None,
        position: 0,
    };

    /// Create a result.
    #[must_use]
    pub fn new(chunk_item: ChunkItem, record_info: Option<RecordInfo>, position: u64) -> Self {
        DataPartitionerResult {
            chunk_item: Some(chunk_item),
            record_info,
            position,
        }
    }

    /// Whether this is an EMPTY result (position is not considered).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunk_item.is_none() && self.record_info.is_none()
    }

    /// Whether the chunk item is absent or successful.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.chunk_item.as_ref().map_or(true, ChunkItem::is_success)
    }
}

/// A lazy, forward-only source of partitioning results.
///
/// The underlying stream is read exactly once; a partitioner cannot be
/// restarted.
pub trait DataPartitioner: std::fmt::Debug {
    /// Charset of the produced chunk item payloads.
    fn encoding(&self) -> Charset;

    /// Raw bytes consumed from the input so far.
    fn bytes_read(&self) -> u64;

    /// Produce the next result.
    ///
    /// Returns `Ok(None)` once the input is exhausted.
    ///
    /// # Errors
    ///
    /// Stream-level failures abort the pass; per-unit failures are reported as
    /// failed chunk items instead.
    fn next_result(&mut self) -> PartitionResult<Option<DataPartitionerResult>>;

    /// Skip `n` results without returning them.
    ///
    /// Used to resume a partially processed job. Stops early at end of input.
    ///
    /// # Errors
    ///
    /// Propagates stream-level failures met while skipping.
    fn drain_items(&mut self, n: usize) -> PartitionResult<()> {
        for _ in 0..n {
            if self.next_result()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Number of results skipped by filtering since the last call.
    fn take_skipped_count(&mut self) -> usize {
        0
    }

    /// Iterate over the remaining results.
    ///
    /// The iterator ends after the first error.
    fn results(&mut self) -> Results<'_, Self>
    where
        Self: Sized,
    {
        Results {
            partitioner: self,
            done: false,
        }
    }
}

impl<P: DataPartitioner + ?Sized> DataPartitioner for Box<P> {
    fn encoding(&self) -> Charset {
        (**self).encoding()
    }

    fn bytes_read(&self) -> u64 {
        (**self).bytes_read()
    }

    fn next_result(&mut self) -> PartitionResult<Option<DataPartitionerResult>> {
        (**self).next_result()
    }

    fn drain_items(&mut self, n: usize) -> PartitionResult<()> {
        (**self).drain_items(n)
    }

    fn take_skipped_count(&mut self) -> usize {
        (**self).take_skipped_count()
    }
}

/// Iterator over the results of a [`DataPartitioner`].
#[derive(Debug)]
pub struct Results<'a, P: DataPartitioner> {
    partitioner: &'a mut P,
    done: bool,
}

impl<P: DataPartitioner> Iterator for Results<'_, P> {
    type Item = PartitionResult<DataPartitionerResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.partitioner.next_result() {
            Ok(Some(result)) => Some(Ok(result)),
            Ok(None) => {
                self.done = true;
                None
            },
            Err(e) => {
                self.done = true;
                Some(Err(e))
            },
        }
    }
}

/// Failed chunk item holding `raw` with a fatal diagnostic for `cause`.
pub(crate) fn failed_item(
    raw: impl Into<Vec<u8>>,
    item_type: ChunkItemType,
    message: &str,
    cause: &dyn StdError,
) -> ChunkItem {
    ChunkItem::failed(raw, item_type).with_diagnostic(Diagnostic::fatal_with_cause(message, cause))
}
