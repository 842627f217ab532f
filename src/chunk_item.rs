//! Outcome of partitioning a single raw unit.
//!
//! A [`ChunkItem`] carries the payload produced for one record together with
//! its status and any [`Diagnostic`]s explaining a failure. Chunk items are
//! what downstream job processing persists, so they serialize with serde.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;

/// Processing status of a chunk item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkItemStatus {
    /// Unit parsed; payload is the transcoded record
    Success,
    /// Unit could not be parsed; payload is the raw input
    Failure,
    /// Unit carries nothing to process (empty record, blank line)
    Ignore,
}

/// Type tag describing the payload of a chunk item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkItemType {
    /// Addi envelope (metadata + content)
    Addi,
    /// Opaque bytes
    Bytes,
    /// Generic XML document (XML splitting, transcoded CSV)
    GenericXml,
    /// JSON document
    Json,
    /// MarcXchange record or collection
    Marcxchange,
    /// Plain text
    String,
    /// Not known
    Unknown,
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticLevel {
    /// Informational problem, item still usable
    Warning,
    /// Item failed but may be salvaged
    Error,
    /// Item (or job) cannot be salvaged automatically
    Fatal,
}

/// A problem attached to a chunk item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub level: DiagnosticLevel,
    /// Human readable message
    pub message: String,
    /// Rendered cause chain, when the diagnostic was raised by an error
    #[serde(default, alias = "stacktrace", skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl Diagnostic {
    /// A diagnostic with the given level and message.
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Diagnostic {
            level,
            message: message.into(),
            cause: None,
        }
    }

    /// A fatal diagnostic.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Fatal, message)
    }

    /// A fatal diagnostic capturing `cause` and its source chain.
    pub fn fatal_with_cause(message: impl Into<String>, cause: &dyn StdError) -> Self {
        let mut rendered = cause.to_string();
        let mut source = cause.source();
        while let Some(err) = source {
            rendered.push_str("\ncaused by: ");
            rendered.push_str(&err.to_string());
            source = err.source();
        }
        Diagnostic {
            cause: Some(rendered),
            ..Self::fatal(message)
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.level, self.message)
    }
}

/// Outcome of parsing one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkItem {
    /// Outcome status
    pub status: ChunkItemStatus,
    /// Payload bytes
    pub data: Vec<u8>,
    /// Encoding of `data`
    pub encoding: String,
    /// Payload type tags, outermost first
    #[serde(rename = "type")]
    pub types: Vec<ChunkItemType>,
    /// Diagnostics, empty for clean items
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Tracking id carried over from the input, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
}

impl ChunkItem {
    fn with_status(status: ChunkItemStatus, data: impl Into<Vec<u8>>, types: Vec<ChunkItemType>) -> Self {
        ChunkItem {
            status,
            data: data.into(),
            encoding: "UTF-8".to_string(),
            types,
            diagnostics: Vec::new(),
            tracking_id: None,
        }
    }

    /// A successful item with a single type tag.
    pub fn successful(data: impl Into<Vec<u8>>, item_type: ChunkItemType) -> Self {
        Self::with_status(ChunkItemStatus::Success, data, vec![item_type])
    }

    /// A successful item with several type tags.
    pub fn successful_with_types(data: impl Into<Vec<u8>>, types: Vec<ChunkItemType>) -> Self {
        Self::with_status(ChunkItemStatus::Success, data, types)
    }

    /// A failed item holding the raw input.
    pub fn failed(data: impl Into<Vec<u8>>, item_type: ChunkItemType) -> Self {
        Self::with_status(ChunkItemStatus::Failure, data, vec![item_type])
    }

    /// An ignored item.
    pub fn ignored(data: impl Into<Vec<u8>>) -> Self {
        Self::with_status(ChunkItemStatus::Ignore, data, vec![ChunkItemType::String])
    }

    /// Set the payload encoding name.
    #[must_use]
    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.encoding = encoding.to_string();
        self
    }

    /// Set the tracking id.
    #[must_use]
    pub fn with_tracking_id(mut self, tracking_id: Option<String>) -> Self {
        self.tracking_id = tracking_id;
        self
    }

    /// Append a diagnostic.
    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// Whether the item parsed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ChunkItemStatus::Success
    }

    /// Payload as text, lossily decoded.
    #[must_use]
    pub fn data_as_string(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
