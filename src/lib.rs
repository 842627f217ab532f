#![warn(missing_docs)]

//! # dataio-partitioner
//!
//! Partitioning of bibliographic data files into per-record results.
//!
//! A data file arrives as a byte stream in one of many physical formats
//! (ISO 2709, danMARC2 line format, Addi, XML, tarred or zipped XML, CSV,
//! JSON lines, VIAF). A [`DataPartitioner`] slices it lazily into raw units
//! and parses each unit on its own, so a malformed record becomes a failed
//! chunk item instead of aborting the file.
//!
//! Catalogs with multi-volume works hold head, section and volume records in
//! no particular order. [`ReorderingDataPartitioner`] buffers those records
//! in a [`Scratchpad`] and releases them parents first.
//!
//! ## Quick Start
//!
//! ```
//! use dataio_partitioner::job::JobSpecification;
//! use dataio_partitioner::partitioner::factory::{create_data_partitioner, RecordSplitter};
//! use dataio_partitioner::reorder::InMemoryScratchpad;
//! use std::io::Cursor;
//!
//! let spec = JobSpecification {
//!     record_splitter: RecordSplitter::DanMarc2LineFormat,
//!     ..JobSpecification::default()
//! };
//! let input = Cursor::new("001 00 *a1234*b870970\n245 00 *aTitle\n$\n");
//! let mut partitioner = create_data_partitioner(input, &spec, InMemoryScratchpad::new())?;
//!
//! let result = partitioner.next_result()?.expect("one record");
//! assert!(result.is_success());
//! assert_eq!(result.record_info.map(|info| info.id), Some("1234".to_string()));
//! assert!(partitioner.next_result()?.is_none());
//! # Ok::<(), dataio_partitioner::PartitionerError>(())
//! ```
//!
//! ## Modules
//!
//! - [`partitioner`]: The partitioner contract, format partitioners and the factory
//! - [`reorder`]: Reorderers, ordering strategies and the scratchpad
//! - [`job`]: Job configuration
//! - [`chunk_item`]: Per-record outcomes and diagnostics
//! - [`record_info`]: Structural classification of records
//! - [`record`]: MARC record model
//! - [`reader`]: ISO 2709 framing and parsing
//! - [`writer`]: ISO 2709 serialization
//! - [`line_format`]: danMARC2 line format
//! - [`marcxchange`]: MarcXchange serialization
//! - [`encoding`]: Charsets, including danMARC2
//! - [`error`]: Error types and result types
//!
//! [`DataPartitioner`]: partitioner::DataPartitioner
//! [`ReorderingDataPartitioner`]: partitioner::ReorderingDataPartitioner
//! [`Scratchpad`]: reorder::Scratchpad

pub mod chunk_item;
pub mod counting;
pub mod encoding;
pub mod error;
pub mod job;
pub mod leader;
pub mod line_format;
pub mod marcxchange;
pub mod partitioner;
pub mod reader;
pub mod record;
pub mod record_info;
pub mod reorder;
pub mod writer;

pub use chunk_item::{ChunkItem, ChunkItemStatus, ChunkItemType, Diagnostic, DiagnosticLevel};
pub use encoding::Charset;
pub use error::{MarcError, PartitionResult, PartitionerError, Result};
pub use job::JobSpecification;
pub use leader::Leader;
pub use partitioner::{DataPartitioner, DataPartitionerResult};
pub use reader::MarcReader;
pub use record::{Field, FieldBuilder, Record, RecordBuilder, Subfield};
pub use record_info::{RecordInfo, RecordType};
pub use writer::MarcWriter;
