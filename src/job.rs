//! Job configuration.
//!
//! A [`JobSpecification`] tells the factory how a data file is to be
//! partitioned. It is plain data, usually read from the JSON that
//! accompanies a job:
//!
//! ```
//! use dataio_partitioner::job::JobSpecification;
//! use dataio_partitioner::partitioner::factory::RecordSplitter;
//!
//! let spec = JobSpecification::from_json(
//!     r#"{"jobId": 42, "recordSplitter": "ISO2709", "charset": "latin1"}"#,
//! )?;
//! assert_eq!(spec.job_id, 42);
//! assert_eq!(spec.record_splitter, RecordSplitter::Iso2709);
//! assert!(spec.include_filter.is_none());
//! # Ok::<(), serde_json::Error>(())
//! ```

use crate::partitioner::factory::RecordSplitter;
use crate::partitioner::PositionSet;
use serde::{Deserialize, Serialize};

/// Origin of a job's data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ancestry {
    /// Name of the transfile the job was created from
    pub transfile: Option<String>,
    /// Name of the data file
    pub datafile: Option<String>,
    /// Delivering batch
    pub batch_id: Option<String>,
}

/// How to partition one job's data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobSpecification {
    /// Job id, scoping scratchpad entries
    pub job_id: i32,
    /// Format of the data file
    pub record_splitter: RecordSplitter,
    /// Declared encoding of the data file
    pub charset: String,
    /// Origin of the data
    pub ancestry: Option<Ancestry>,
    /// Deliver volumes merged with their parents
    pub include_parents: bool,
    /// Preview run; transfile jobs are not reordered
    pub preview_only: bool,
    /// Positions to rerun; every position when absent
    pub include_filter: Option<PositionSet>,
}

impl Default for JobSpecification {
    fn default() -> Self {
        JobSpecification {
            job_id: 0,
            record_splitter: RecordSplitter::default(),
            charset: "UTF-8".to_string(),
            ancestry: None,
            include_parents: false,
            preview_only: false,
            include_filter: None,
        }
    }
}

impl JobSpecification {
    /// Read a specification from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or unknown splitter names.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
