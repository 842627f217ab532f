//! Building the partitioner stack for a job.
//!
//! [`create_data_partitioner`] picks the format partitioner named by the
//! job's [`RecordSplitter`], wraps it in a [`ReorderingDataPartitioner`] when
//! the job calls for reordering and the format can classify records, and
//! finally in an [`IncludeFilterDataPartitioner`] when only some positions
//! are to be rerun.

use super::{
    AddiDataPartitioner, CsvDataPartitioner, CsvDialect, DataPartitioner,
    IncludeFilterDataPartitioner, Iso2709DataPartitioner, JsonDataPartitioner,
    LineFormatDataPartitioner, ReorderingDataPartitioner, TarredXmlDataPartitioner,
    ViafDataPartitioner, XmlDataPartitioner, ZippedXmlDataPartitioner,
};
use crate::error::PartitionResult;
use crate::job::JobSpecification;
use crate::reorder::{Scratchpad, TypeOfReordering};
use log::info;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Physical format of a data file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordSplitter {
    /// Comma separated values
    Csv,
    /// danMARC2 line format
    #[serde(rename = "DANMARC2_LINE_FORMAT")]
    DanMarc2LineFormat,
    /// danMARC2 line format, records wrapped in collections
    #[serde(rename = "DANMARC2_LINE_FORMAT_COLLECTION")]
    DanMarc2LineFormatCollection,
    /// ISO 2709
    #[default]
    Iso2709,
    /// ISO 2709, records wrapped in collections
    Iso2709Collection,
    /// Addi records with opaque content
    Addi,
    /// Addi records wrapping MarcXchange
    #[serde(rename = "ADDI_MARC_XML")]
    AddiMarcXchange,
    /// XML document, one record per child of the root
    Xml,
    /// Tar archive of XML documents
    TarredXml,
    /// Zip archive of XML documents
    ZippedXml,
    /// JSON lines
    Json,
    /// VIAF dump
    Viaf,
    /// Semicolon separated VIP export
    VipCsv,
    /// DSD export with header row
    DsdCsv,
}

impl RecordSplitter {
    /// Every splitter.
    pub const ALL: [RecordSplitter; 14] = [
        RecordSplitter::Csv,
        RecordSplitter::DanMarc2LineFormat,
        RecordSplitter::DanMarc2LineFormatCollection,
        RecordSplitter::Iso2709,
        RecordSplitter::Iso2709Collection,
        RecordSplitter::Addi,
        RecordSplitter::AddiMarcXchange,
        RecordSplitter::Xml,
        RecordSplitter::TarredXml,
        RecordSplitter::ZippedXml,
        RecordSplitter::Json,
        RecordSplitter::Viaf,
        RecordSplitter::VipCsv,
        RecordSplitter::DsdCsv,
    ];

    /// Whether results carry record info a reorderer can act on.
    #[must_use]
    pub fn supports_reordering(self) -> bool {
        match self {
            RecordSplitter::DanMarc2LineFormat
            | RecordSplitter::DanMarc2LineFormatCollection
            | RecordSplitter::Iso2709
            | RecordSplitter::Iso2709Collection
            | RecordSplitter::AddiMarcXchange => true,
            RecordSplitter::Csv
            | RecordSplitter::Addi
            | RecordSplitter::Xml
            | RecordSplitter::TarredXml
            | RecordSplitter::ZippedXml
            | RecordSplitter::Json
            | RecordSplitter::Viaf
            | RecordSplitter::VipCsv
            | RecordSplitter::DsdCsv => false,
        }
    }
}

/// Format partitioner for `splitter` over `input`.
///
/// With `collection` set, MARC formats wrap every record in a collection.
///
/// # Errors
///
/// Returns [`crate::PartitionerError::InvalidEncoding`] for an unknown
/// encoding.
pub fn create_format_partitioner<'a, R: Read + std::fmt::Debug + 'a>(
    input: R,
    splitter: RecordSplitter,
    encoding: &str,
    collection: bool,
) -> PartitionResult<Box<dyn DataPartitioner + 'a>> {
    Ok(match splitter {
        RecordSplitter::Csv => Box::new(CsvDataPartitioner::new(input, encoding)?),
        RecordSplitter::VipCsv => {
            Box::new(CsvDataPartitioner::with_dialect(input, encoding, CsvDialect::Vip)?)
        },
        RecordSplitter::DsdCsv => {
            Box::new(CsvDataPartitioner::with_dialect(input, encoding, CsvDialect::Dsd)?)
        },
        RecordSplitter::DanMarc2LineFormat if !collection => {
            Box::new(LineFormatDataPartitioner::new(input, encoding)?)
        },
        RecordSplitter::DanMarc2LineFormat | RecordSplitter::DanMarc2LineFormatCollection => {
            Box::new(LineFormatDataPartitioner::collection(input, encoding)?)
        },
        RecordSplitter::Iso2709 if !collection => {
            Box::new(Iso2709DataPartitioner::new(input, encoding)?)
        },
        RecordSplitter::Iso2709 | RecordSplitter::Iso2709Collection => {
            Box::new(Iso2709DataPartitioner::collection(input, encoding)?)
        },
        RecordSplitter::Addi => Box::new(AddiDataPartitioner::new(input, encoding)?),
        RecordSplitter::AddiMarcXchange => {
            Box::new(AddiDataPartitioner::marcxchange(input, encoding)?)
        },
        RecordSplitter::Xml => Box::new(XmlDataPartitioner::new(input, encoding)?),
        RecordSplitter::TarredXml => Box::new(TarredXmlDataPartitioner::new(input, encoding)?),
        RecordSplitter::ZippedXml => Box::new(ZippedXmlDataPartitioner::new(input, encoding)?),
        RecordSplitter::Json => Box::new(JsonDataPartitioner::new(input, encoding)?),
        RecordSplitter::Viaf => Box::new(ViafDataPartitioner::new(input, encoding)?),
    })
}

/// Partitioner stack for the job described by `spec`.
///
/// `scratchpad` holds records buffered for reordering; it is left untouched
/// when the job is not reordered.
///
/// # Errors
///
/// Returns an error for an unknown encoding or if the scratchpad cannot be
/// read.
pub fn create_data_partitioner<'a, R, S>(
    input: R,
    spec: &JobSpecification,
    scratchpad: S,
) -> PartitionResult<Box<dyn DataPartitioner + 'a>>
where
    R: Read + std::fmt::Debug + 'a,
    S: Scratchpad + 'a,
{
    let splitter = spec.record_splitter;
    let reorderer = match TypeOfReordering::for_job(spec) {
        Some(kind) if splitter.supports_reordering() => {
            info!("Job {} uses {splitter:?} reordered as {kind:?}", spec.job_id);
            Some(kind.reorderer(spec.job_id, scratchpad)?)
        },
        _ => {
            info!("Job {} uses {splitter:?}", spec.job_id);
            None
        },
    };

    let collection = reorderer
        .as_ref()
        .is_some_and(|reorderer| reorderer.wants_collection_wrapper());
    let mut partitioner = create_format_partitioner(input, splitter, &spec.charset, collection)?;

    if let Some(reorderer) = reorderer {
        partitioner = Box::new(ReorderingDataPartitioner::new(partitioner, reorderer));
    }
    if let Some(include) = &spec.include_filter {
        info!("Job {} reruns {} positions", spec.job_id, include.len());
        partitioner = Box::new(IncludeFilterDataPartitioner::new(partitioner, include.clone()));
    }
    Ok(partitioner)
}
