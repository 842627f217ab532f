//! Structural classification of bibliographic records.
//!
//! danMARC2 marks multi-volume works with field `004 *r`: `h` for a head
//! record, `s` for a section and `b` for a volume. Sections and volumes point
//! at their parent through `014 *a`. Only these classification fields matter
//! to partitioning; the rest of the record is opaque.

use crate::record::Record;
use serde::{Deserialize, Serialize};

/// Position of a record in a multi-volume hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    /// Not part of a hierarchy
    Standalone,
    /// Top of a hierarchy
    Head,
    /// Intermediate level, child of a head
    Section,
    /// Leaf, child of a head or a section
    Volume,
}

impl RecordType {
    /// Classify a `004 *r` code.
    #[must_use]
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("h") => RecordType::Head,
            Some("s") => RecordType::Section,
            Some("b") => RecordType::Volume,
            _ => RecordType::Standalone,
        }
    }
}

/// Classification fields extracted from a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInfo {
    /// Record id (`001 *a`)
    pub id: String,
    /// Submitting agency (`001 *b`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<String>,
    /// Hierarchy level
    pub record_type: RecordType,
    /// Whether the record is a deletion
    pub is_delete: bool,
    /// Id of the parent record (`014 *a`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_relation: Option<String>,
}

impl RecordInfo {
    /// Create record info without submitter.
    pub fn new(
        id: impl Into<String>,
        record_type: RecordType,
        is_delete: bool,
        parent_relation: Option<String>,
    ) -> Self {
        RecordInfo {
            id: id.into(),
            submitter: None,
            record_type,
            is_delete,
            parent_relation,
        }
    }

    /// Derive record info from a parsed record.
    ///
    /// Returns `None` for records without an id.
    #[must_use]
    pub fn from_record(record: &Record) -> Option<Self> {
        let id = record
            .subfield_value("001", 'a')
            .or_else(|| record.get_control_field("001"))?
            .trim();
        if id.is_empty() {
            return None;
        }

        let is_delete =
            record.subfield_value("004", 'a') == Some("d") || record.leader.is_deleted();

        Some(RecordInfo {
            id: id.to_string(),
            submitter: record.subfield_value("001", 'b').map(str::to_string),
            record_type: RecordType::from_code(record.subfield_value("004", 'r')),
            is_delete,
            parent_relation: record
                .subfield_value("014", 'a')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    /// Whether the record takes part in a hierarchy and must be held back
    /// for reordering.
    #[must_use]
    pub fn must_be_reordered(&self) -> bool {
        matches!(
            self.record_type,
            RecordType::Head | RecordType::Section | RecordType::Volume
        )
    }

    /// True for head records.
    #[must_use]
    pub fn is_head(&self) -> bool {
        self.record_type == RecordType::Head
    }

    /// True for section records.
    #[must_use]
    pub fn is_section(&self) -> bool {
        self.record_type == RecordType::Section
    }

    /// True for volume records.
    #[must_use]
    pub fn is_volume(&self) -> bool {
        self.record_type == RecordType::Volume
    }
}
