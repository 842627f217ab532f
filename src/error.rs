//! Error types for partitioning and MARC operations.
//!
//! Two error families exist:
//!
//! - [`MarcError`] describes a problem with a single MARC record. Partitioners
//!   never let it escape; it is turned into a failed chunk item and iteration
//!   continues with the next record.
//! - [`PartitionerError`] describes a problem with the stream as a whole (or an
//!   internal reordering invariant). It aborts the partitioning pass.

use thiserror::Error;

/// Error type for operations on a single MARC record.
///
/// Represents the various error conditions that can occur while parsing,
/// decoding or serializing one record.
#[derive(Error, Debug)]
pub enum MarcError {
    /// Error indicating an invalid or malformed MARC record.
    #[error("Invalid MARC record: {0}")]
    InvalidRecord(String),

    /// Error indicating an invalid leader (24-byte header).
    #[error("Invalid leader: {0}")]
    InvalidLeader(String),

    /// Error indicating an invalid field structure.
    #[error("Invalid field: {0}")]
    InvalidField(String),

    /// Error related to character encoding conversion.
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// Error during parsing or serialization of MARC data.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Error indicating a truncated or incomplete record.
    #[error("Truncated record: {0}")]
    TruncatedRecord(String),

    /// IO error from the underlying source/destination.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Convenience type alias for [`std::result::Result`] with [`MarcError`].
pub type Result<T> = std::result::Result<T, MarcError>;

/// Unrecoverable error raised while partitioning a data stream.
///
/// Any of these aborts the current pass over the input; the caller is
/// expected to retry the whole file (or give up on it).
#[derive(Error, Debug)]
pub enum PartitionerError {
    /// The declared encoding is unknown, or differs from the encoding the
    /// data itself declares.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A byte sequence could not be decoded with the declared encoding.
    #[error("Undecodable data: {0}")]
    UndecodableData(String),

    /// The stream structure itself is broken (framing, XML nesting, archive
    /// headers) so no further units can be located.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The stream ended in the middle of a unit.
    #[error("Premature end of data: {0}")]
    PrematureEndOfData(String),

    /// The reorderer found its scratchpad in an inconsistent state, or could
    /// not merge buffered records.
    #[error("Reordering failed: {0}")]
    Reorder(String),

    /// The scratchpad store rejected an operation.
    #[error("Scratchpad error: {0}")]
    Scratchpad(String),

    /// IO error from the underlying source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for [`std::result::Result`] with [`PartitionerError`].
pub type PartitionResult<T> = std::result::Result<T, PartitionerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts_into_partitioner_error() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: PartitionerError = io.into();
        assert!(matches!(err, PartitionerError::Io(_)));
        assert_eq!(err.to_string(), "IO error: short read");
    }

    #[test]
    fn test_marc_error_display() {
        let err = MarcError::InvalidField("Tag 245: Expected subfield delimiter".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid field: Tag 245: Expected subfield delimiter"
        );
    }
}
